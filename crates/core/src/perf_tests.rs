// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn vdr_record_serde_round_trip() {
    let record = VdrRecord {
        count: 1,
        size: 1024,
        timestamp: "2026-01-01 00:00:00".to_string(),
        paths: vec!["files/big.bam".to_string()],
        events: vec![VdrEvent {
            path: "files/big.bam".to_string(),
            size: 1024,
            timestamp: "2026-01-01 00:00:00".to_string(),
        }],
    };
    let json = serde_json::to_string(&record).unwrap();
    let back: VdrRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}

#[test]
fn jobinfo_flattens_resources() {
    let info = JobInfo {
        name: "split".to_string(),
        job_mode: "local".to_string(),
        resources: JobResources::new(1, 2),
        uniquifier: None,
        pid: Some(42),
        host: None,
    };
    let value = serde_json::to_value(&info).unwrap();
    assert_eq!(value["threads"], 1);
    assert_eq!(value["mem_gb"], 2);
    assert_eq!(value["pid"], 42);
}

#[test]
fn fork_perf_defaults_tolerate_missing_fields() {
    let json = r#"{"fqname":"ID.x.P.S","index":0,"attempts":1,"state":"complete"}"#;
    let perf: ForkPerf = serde_json::from_str(json).unwrap();
    assert!(perf.chunks.is_empty());
    assert!(perf.vdr.is_none());
}
