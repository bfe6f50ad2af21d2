use std::hint::black_box;
use std::path::PathBuf;
use std::time::SystemTime;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use regex::Regex;

use techlog_shipper::catalog::FileRecord;
use techlog_shipper::event::EventAssembler;
use techlog_shipper::parsers::{split_span, TechlogParser, ValueCleaner};
use techlog_shipper::StreamBy;

const FLAT: &str = "08:23.150000-0,CONN,2,process=rphost,OSThread=5736,t:clientID=7,Txt='Clnt: connected, port 1541'\n";
const DETAIL: &str = "08:24.000001-15,DBMSSQL,3,process=rphost,p:processName=base,Sql='SELECT T1._IDRRef FROM #tt12 T1',Rows=1,Context='Form.Item.Command : Catalog.Goods.Form.ItemForm\n\tRefresh'\n";

fn span(records: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..records {
        out.push_str(if i % 3 == 0 { DETAIL } else { FLAT });
    }
    out.into_bytes()
}

fn parser() -> TechlogParser {
    TechlogParser::new(
        Regex::new("(Context|Sql)=").unwrap(),
        ValueCleaner::new(true, true),
    )
}

fn bench_split_span(c: &mut Criterion) {
    let data = span(1000);
    let mut group = c.benchmark_group("split_span");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("1000_records", |b| {
        b.iter(|| black_box(split_span(black_box(&data))));
    });
    group.finish();
}

fn bench_parse_body(c: &mut Criterion) {
    let parser = parser();
    let flat = &FLAT[13..];
    let detail = &DETAIL[13..];
    c.bench_function("parse_body_flat", |b| {
        b.iter(|| black_box(parser.parse_body(black_box(flat))));
    });
    c.bench_function("parse_body_detail", |b| {
        b.iter(|| black_box(parser.parse_body(black_box(detail))));
    });
}

fn bench_span_to_documents(c: &mut Criterion) {
    let data = span(1000);
    let parser = parser();
    let mut file = FileRecord::new(
        PathBuf::from("/var/log/1c/rphost_4242/23051408.log"),
        data.len() as u64,
        SystemTime::UNIX_EPOCH,
    );
    file.derive("job_").unwrap();
    let assembler = EventAssembler::new(&file, StreamBy::Process);

    let mut group = c.benchmark_group("span_to_documents");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("1000_records", |b| {
        b.iter(|| {
            let split = split_span(&data);
            for raw in split.events {
                let record = parser.parse_body(&raw.body);
                black_box(assembler.assemble(record, &raw.time).unwrap());
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_split_span, bench_parse_body, bench_span_to_documents);
criterion_main!(benches);
