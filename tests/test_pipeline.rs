mod common;
use common::{cap_labels, hemisphere_montage, raw_session, write_xyz, SFREQ};
use exg_prep::batch::{self, BatchError};
use exg_prep::io::{load_recording, save_raw_session, save_recording, StFile};
use exg_prep::{
    ChannelMap, EventDictionary, FixedAnswer, IcaConfig, IngestConfig, PipelineConfig,
    RecordingGroup, RecordingSpec, Review, Stage,
};
use std::path::Path;

const N_EEG: usize = 8;
const N_TIMES: usize = 7_500;

/// Trials every 1000 samples from 500, cycling through `codes`, plus a last
/// trial 200 samples before the end.
fn pulses(codes: &[i32]) -> Vec<(usize, i32)> {
    let mut p: Vec<(usize, i32)> = (0..7).map(|i| (500 + 1000 * i, codes[i % codes.len()])).collect();
    p.push((N_TIMES - 200, codes[0]));
    p
}

fn write_session(dir: &Path, id: &str, codes: &[i32], seed: u64) -> RecordingSpec {
    let path = dir.join(format!("{id}.safetensors"));
    let raw = raw_session(N_EEG, N_TIMES, &pulses(codes), 10, seed);
    save_raw_session(&raw, SFREQ, &path).unwrap();
    RecordingSpec { id: id.into(), path, bad_channels: Vec::new() }
}

/// Two groups with the study's per-group code assignments.
fn config(dir: &Path) -> PipelineConfig {
    let labels = cap_labels(N_EEG);
    let montage_path = dir.join("cap.xyz");
    write_xyz(&hemisphere_montage(&labels), &montage_path);

    let group_a = RecordingGroup {
        name: "a".into(),
        channel_map: ChannelMap::sequential(&labels),
        event_dict: EventDictionary::new([
            ("motor execution down", 1),
            ("visual perception up", 2),
            ("imagery down", 3),
            ("imagery and perception down", 4),
        ])
        .unwrap(),
        recordings: vec![write_session(dir, "a1", &[2, 1], 1), write_session(dir, "a2", &[2], 2)],
    };
    let mut b1 = write_session(dir, "b1", &[2, 4, 3], 3);
    b1.bad_channels = vec!["F7".into()];
    let group_b = RecordingGroup {
        name: "b".into(),
        channel_map: ChannelMap::sequential(&labels),
        event_dict: EventDictionary::new([
            ("motor execution up", 1),
            ("visual perception down", 2),
            ("imagery up", 3),
            ("imagery and perception up", 4),
        ])
        .unwrap(),
        recordings: vec![b1],
    };

    PipelineConfig {
        ingest: IngestConfig { n_channels: N_EEG + 1, ..IngestConfig::default() },
        montage: montage_path,
        ica: IcaConfig { n_components: 4, max_iter: 200, ..IcaConfig::default() },
        checkpoint_dir: dir.join("ckpt"),
        output: dir.join("out").join("dataset.safetensors"),
        groups: vec![group_a, group_b],
        ..PipelineConfig::default()
    }
}

// a1: 2,1,2,1,2,1,2 + 2   → 5 targets ("visual perception up", code 3 globally)
// a2: 2 × 8                → 8 targets
// b1: 2,4,3,2,4,3,2 + 2   → 4 targets ("visual perception down", code 4 globally)
// The last trial of b1 runs past the end of the concatenation.
const EXPECTED_EPOCHS: usize = 5 + 8 + 4 - 1;

#[test]
fn batch_exports_dataset_and_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let (report, ds) = batch::run(&cfg, &mut FixedAnswer("0".into())).unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.recordings.len(), 3);
    assert_eq!(report.n_events, 8 + 8 + 8);
    assert_eq!(report.n_epochs, EXPECTED_EPOCHS);
    assert_eq!(report.n_dropped, 1);
    assert_eq!(ds.len(), EXPECTED_EPOCHS);
    assert_eq!(report.label_counts.values().sum::<usize>(), EXPECTED_EPOCHS);
    assert!(ds.labels().iter().all(|&l| l == 3 || l == 4));
    assert_eq!(report.label_counts.get(&3), Some(&13));
    assert_eq!(report.label_counts.get(&4), Some(&3));

    for id in ["a1", "a2", "b1"] {
        let ckpt = load_recording(&cfg.checkpoint_path(id)).unwrap();
        assert_eq!(ckpt.data.dim(), (N_EEG, N_TIMES));
        assert_eq!(ckpt.sfreq(), SFREQ);
    }
    let b1 = load_recording(&cfg.checkpoint_path("b1")).unwrap();
    let f7 = b1.channel_index("F7").unwrap();
    assert!(b1.channels[f7].interpolated && !b1.channels[f7].bad);

    let f = StFile::open(&cfg.output).unwrap();
    assert_eq!(f.tensor("epochs").unwrap().shape, vec![EXPECTED_EPOCHS, N_EEG, 750]);
}

#[test]
fn resume_skips_decomposition_and_decision() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    let (_, first) = batch::run(&cfg, &mut FixedAnswer("1 2".into())).unwrap();

    cfg.resume = true;
    let mut calls = 0usize;
    let mut counting = |_: &Review<'_>| -> exg_prep::Result<String> {
        calls += 1;
        Ok(String::new())
    };
    let (report, second) = batch::run(&cfg, &mut counting).unwrap();
    assert_eq!(calls, 0);
    assert!(report.recordings.iter().all(|r| r.resumed));
    assert_eq!(first.labels(), second.labels());
    assert_eq!(first.epochs()[0].data, second.epochs()[0].data);
}

#[test]
fn dataset_is_assembled_from_the_checkpoints_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    batch::run(&cfg, &mut FixedAnswer("0".into())).unwrap();

    let path = cfg.checkpoint_path("a1");
    let a1 = load_recording(&path).unwrap();
    let zeroed = a1.with_data(ndarray::Array2::zeros(a1.data.dim())).unwrap();
    save_recording(&zeroed, &path).unwrap();

    cfg.resume = true;
    let (_, ds) = batch::run(&cfg, &mut FixedAnswer(String::new())).unwrap();
    let inside_a1: Vec<_> = ds.epochs().iter().filter(|e| e.start + 750 <= N_TIMES).collect();
    assert_eq!(inside_a1.len(), 4);
    assert!(inside_a1.iter().all(|e| e.data.iter().all(|&v| v == 0.0)));
}

#[test]
fn truncated_checkpoint_fails_on_resume() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    batch::run(&cfg, &mut FixedAnswer("0".into())).unwrap();
    std::fs::write(cfg.checkpoint_path("a2"), [1u8, 2, 3]).unwrap();

    cfg.resume = true;
    let err = batch::run(&cfg, &mut FixedAnswer(String::new())).unwrap_err();
    let BatchError::Incomplete(report) = err else {
        panic!("expected an incomplete batch, got {err}");
    };
    let failed: Vec<(&str, Stage)> = report.failures.iter().map(|f| (f.recording.as_str(), f.stage)).collect();
    assert_eq!(failed, vec![("a2", Stage::Checkpoint)]);
}

#[test]
fn failed_recording_is_reported_and_others_continue() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.groups[0].recordings[1].path = dir.path().join("missing.safetensors");
    cfg.groups[1].recordings[0].bad_channels = vec!["Nope".into()];

    let err = batch::run(&cfg, &mut FixedAnswer(String::new())).unwrap_err();
    let BatchError::Incomplete(report) = err else {
        panic!("expected an incomplete batch, got {err}");
    };
    let failed: Vec<(&str, Stage)> = report.failures.iter().map(|f| (f.recording.as_str(), f.stage)).collect();
    assert_eq!(failed, vec![("a2", Stage::Ingest), ("b1", Stage::Interpolate)]);
    assert_eq!(report.recordings.len(), 1);
    assert!(cfg.checkpoint_path("a1").exists());
    assert!(!cfg.output.exists());
}

#[test]
fn invalid_answer_fails_at_select() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let err = batch::run(&cfg, &mut FixedAnswer("4".into())).unwrap_err();
    let BatchError::Incomplete(report) = err else {
        panic!("expected an incomplete batch, got {err}");
    };
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|f| f.stage == Stage::Select));
    assert!(!cfg.checkpoint_path("a1").exists());
}

#[test]
fn duplicate_ids_are_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    let dup = cfg.groups[0].recordings[0].clone();
    cfg.groups[1].recordings.push(dup);
    assert!(matches!(batch::run(&cfg, &mut FixedAnswer(String::new())), Err(BatchError::Config(_))));
}
