//! Benchmarks for tag ordering and reference parsing.
//!
//! Both run once per repository and pass during an update or release, so
//! large tag lists and wide trees make them hot.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use repotree::reference::{normalize_url, RepoRef};
use repotree::resolver::preferred_reference;
use repotree::version::{find_latest_version, next_unused, sort_tags_descending, Increment};
use semver::Version;

/// A tag list shaped like a long-lived project: releases, `v` prefixes,
/// pre-releases and some tags that are not versions at all.
fn create_tags() -> Vec<String> {
    let mut tags = Vec::new();
    for major in 0..5 {
        for minor in 0..20 {
            for patch in 0..10 {
                if patch % 2 == 0 {
                    tags.push(format!("v{}.{}.{}", major, minor, patch));
                } else {
                    tags.push(format!("{}.{}.{}", major, minor, patch));
                }
            }
            tags.push(format!("{}.{}.0-rc.1", major, minor));
        }
    }
    for i in 0..50 {
        tags.push(format!("deploy-{}", i));
    }
    tags
}

fn bench_tag_ordering(c: &mut Criterion) {
    let tags = create_tags();
    let mut group = c.benchmark_group("tags");

    group.bench_function("sort_descending", |b| {
        b.iter(|| sort_tags_descending(black_box(&tags)))
    });

    group.bench_function("find_latest", |b| {
        b.iter(|| find_latest_version(black_box(&tags)))
    });

    // Worst case: every patch of 4.19 is taken
    let base = Version::new(4, 19, 0);
    group.bench_function("next_unused_patch", |b| {
        b.iter(|| next_unused(black_box(&base), black_box(&tags), Increment::Patch))
    });

    group.finish();
}

fn bench_references(c: &mut Criterion) {
    let references = [
        "git+ssh://git@github.com/acme/widgets.git#v1.2.3",
        "https://github.com/acme/widgets#master",
        "git@github.com:acme/widgets.git#feature/login",
        "file:///srv/git/widgets.git",
    ];
    let mut group = c.benchmark_group("references");

    group.bench_function("parse", |b| {
        b.iter(|| {
            for reference in &references {
                let _ = black_box(RepoRef::parse(black_box(reference)));
            }
        })
    });

    group.bench_function("normalize_url", |b| {
        b.iter(|| {
            for reference in &references {
                black_box(normalize_url(black_box(reference)));
            }
        })
    });

    let conflicting: Vec<String> = (0..20)
        .map(|i| format!("https://github.com/acme/widgets#1.{}.0", i))
        .chain(std::iter::once(
            "https://github.com/acme/widgets#master".to_string(),
        ))
        .collect();
    group.bench_function("preferred_reference", |b| {
        b.iter(|| preferred_reference(black_box(&conflicting), "master"))
    });

    group.finish();
}

criterion_group!(benches, bench_tag_ordering, bench_references);
criterion_main!(benches);
