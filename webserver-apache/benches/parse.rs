use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use webserver_apache::{parse_str, ExportOptions};

fn site_config(vhosts: usize) -> String {
    let mut source = String::from("# Shared configs\nIncludeOptional /srv/config/shared/*.conf\n\n");
    for i in 0..vhosts {
        source.push_str(&format!(
            "<VirtualHost *:80>\n    ServerName site{i}.example.com\n    ServerAlias www.site{i}.example.com\n    DocumentRoot /srv/site{i}/public\n    ErrorLog /srv/site{i}/log/error.log\n    CustomLog /srv/site{i}/log/access.log combined\n    # custom configs\n    IncludeOptional /srv/site{i}/config/site/*.conf\n    <Directory /srv/site{i}/public>\n        Options -Indexes +FollowSymLinks\n        AllowOverride All\n        <IfModule mod_rewrite.c>\n            RewriteEngine on\n        </IfModule>\n        Require all granted\n    </Directory>\n</VirtualHost>\n\n"
        ));
    }
    source
}

fn parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for size in [1, 10, 100].iter() {
        let source = site_config(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, source| {
            b.iter(|| parse_str(black_box(source)).unwrap());
        });
    }

    group.finish();
}

fn export_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");
    let sorted = ExportOptions {
        sort_directives: true,
        ..ExportOptions::default()
    };

    for size in [1, 10, 100].iter() {
        let config = parse_str(&site_config(*size)).unwrap();
        group.bench_with_input(BenchmarkId::new("source_order", size), &config, |b, config| {
            b.iter(|| black_box(config.export()));
        });
        group.bench_with_input(BenchmarkId::new("sorted", size), &config, |b, config| {
            b.iter(|| black_box(config.export_with_options(&sorted)));
        });
    }

    group.finish();
}

criterion_group!(benches, parse_benchmark, export_benchmark);
criterion_main!(benches);
