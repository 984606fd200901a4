//! Indexing throughput: full rebuild against an incremental run where one
//! file changed.

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use symgraph::config::Config;
use symgraph::index::db::IndexDatabase;
use symgraph::indexer::{discover_files, Indexer};

fn generate_python_module(module: usize, functions: usize) -> String {
    let mut content = String::new();
    if module > 0 {
        content.push_str(&format!("from pkg.mod{} import Service{}\n\n", module - 1, module - 1));
    }
    for i in 0..functions {
        content.push_str(&format!("def helper_{}_{}(x):\n    return x + {}\n\n", module, i, i));
    }
    let base = if module > 0 {
        format!("Service{}", module - 1)
    } else {
        "object".to_string()
    };
    content.push_str(&format!("class Service{}({}):\n    def run(self):\n", module, base));
    for i in 0..functions {
        content.push_str(&format!("        helper_{}_{}(1)\n", module, i));
    }
    content.push_str("        return True\n");
    content
}

fn write_project(root: &Path, files: usize) {
    let pkg = root.join("pkg");
    std::fs::create_dir_all(&pkg).unwrap();
    for module in 0..files {
        std::fs::write(pkg.join(format!("mod{}.py", module)), generate_python_module(module, 10)).unwrap();
    }
}

fn bench_full_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_rebuild");
    group.sample_size(10);

    for files in [10usize, 50, 100] {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path(), files);
        let sources = discover_files(dir.path(), &Config::default()).unwrap();
        let indexer = Indexer::new(IndexDatabase::in_memory().unwrap(), 4).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(files), &sources, |b, sources| {
            b.iter(|| black_box(indexer.run(sources, true).unwrap()))
        });
    }
    group.finish();
}

fn bench_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_one_change");
    group.sample_size(10);

    for files in [10usize, 50, 100] {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path(), files);
        let sources = discover_files(dir.path(), &Config::default()).unwrap();
        let indexer = Indexer::new(IndexDatabase::in_memory().unwrap(), 4).unwrap();
        indexer.run(&sources, true).unwrap();

        let changed = dir.path().join("pkg/mod0.py");
        let mut generation = 0usize;
        group.bench_with_input(BenchmarkId::from_parameter(files), &sources, |b, sources| {
            b.iter(|| {
                generation += 1;
                std::fs::write(&changed, format!("{}\n# {}\n", generate_python_module(0, 10), generation))
                    .unwrap();
                black_box(indexer.run(sources, false).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_rebuild, bench_incremental);
criterion_main!(benches);
