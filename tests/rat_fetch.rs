//! Live scenarios against zenodo.org.
//!
//! Run with `cargo test --test rat_fetch -- --ignored`. Group scenarios are slow;
//! exclude them with `RAT_FETCH_SKIP_SLOW=1`. Conversion scenarios need `dcm2niix`.

use std::sync::OnceLock;

use rat_fetch::config::ConfigLoader;
use rat_fetch::domain::StudyId;
use rat_fetch::harness::{Environment, Outcome, Scenario, run_scenario};
use rat_fetch::probe::zenodo_online;
use rat_fetch::rat_fetch;
use rat_fetch::zenodo::{ZenodoClient, ZenodoHttpClient, find_study_file};

fn online() -> bool {
    static ONLINE: OnceLock<bool> = OnceLock::new();
    *ONLINE.get_or_init(zenodo_online)
}

fn run(name: &str) {
    let scenario = Scenario::find(name).expect("scenario is in the table");
    if !online() {
        eprintln!("Zenodo unreachable; skipping {name}.");
        return;
    }

    let outcome = run_scenario(scenario, &Environment::detect(), |dataset, folder, unzip, convert| {
        rat_fetch(dataset, folder, unzip, convert)
    });
    match outcome {
        Ok(Outcome::Passed { returned }) => {
            println!(
                "[OK] rat_fetch(dataset={:?}, unzip={}, convert={}) passed with {} paths.",
                scenario.dataset,
                scenario.unzip,
                scenario.convert,
                returned.len()
            );
        }
        Ok(Outcome::Skipped { reason }) => eprintln!("{name} skipped: {reason}"),
        Err(err) => panic!("{name}: {err}"),
    }
}

#[test]
#[ignore = "network: downloads from zenodo.org"]
fn s01_download_only() {
    run("S01-download_only");
}

#[test]
#[ignore = "network: downloads from zenodo.org"]
fn s01_unzip_convert() {
    run("S01-unzip+convert");
}

#[test]
#[ignore = "network: downloads from zenodo.org"]
fn group_rifampicin_effect_size_unzip_only() {
    run("group-rifampicin_effect_size-unzip_only");
}

#[test]
#[ignore = "network: downloads from zenodo.org"]
fn group_six_compound_unzip_convert() {
    run("group-six_compound-unzip+convert");
}

#[test]
#[ignore = "network: downloads from zenodo.org"]
fn group_field_strength_unzip_only() {
    run("group-field_strength-unzip_only");
}

#[test]
#[ignore = "network: downloads from zenodo.org"]
fn group_chronic_unzip_convert() {
    run("group-chronic-unzip+convert");
}

#[test]
#[ignore = "network: lists the configured Zenodo record"]
fn configured_record_has_every_study() {
    if !online() {
        eprintln!("Zenodo unreachable; skipping record listing.");
        return;
    }
    let config = ConfigLoader::resolve(None).expect("config resolves");
    let client = ZenodoHttpClient::new(&config).expect("client builds");
    let files = client
        .record_files(&config.record_id)
        .expect("record listing succeeds");
    for study in StudyId::all() {
        find_study_file(&files, &study, &config.record_id)
            .unwrap_or_else(|err| panic!("record {}: {err}", config.record_id));
    }
}

#[test]
#[ignore = "network: probes zenodo.org"]
fn probe_is_idempotent() {
    assert_eq!(zenodo_online(), zenodo_online());
}
