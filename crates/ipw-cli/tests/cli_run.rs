use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ipwstat"))
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("ipwstat_cli_run_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn simulate(n: usize, seed: u64) -> PathBuf {
    let data = tmp_path("cohort.csv");
    let out = run(&[
        "simulate",
        "-o",
        data.to_string_lossy().as_ref(),
        "--n",
        &n.to_string(),
        "--seed",
        &seed.to_string(),
    ]);
    assert!(
        out.status.success(),
        "simulate failed, stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    data
}

#[test]
fn version_prints_crate_version() {
    let out = run(&["version"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("ipwstat "), "stdout={}", stdout);
}

#[test]
fn simulate_writes_nhefs_header() {
    let data = simulate(50, 1);
    let text = std::fs::read_to_string(&data).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("seqn,qsmk,wt82_71,"), "header={}", header);
    assert!(header.contains("smokeintensity") && header.contains("wt71"));
    assert_eq!(text.lines().count(), 51);
    let _ = std::fs::remove_file(&data);
}

#[test]
fn run_json_reports_effect_near_truth() {
    let data = simulate(1000, 42);
    let config = tmp_path("config.json");
    std::fs::write(
        &config,
        r#"{
            "terms": [
                {"kind": "linear", "covariate": "sex"},
                {"kind": "linear", "covariate": "age"},
                {"kind": "linear", "covariate": "race"},
                {"kind": "linear", "covariate": "smoke_intensity"},
                {"kind": "linear", "covariate": "baseline_weight"},
                {"kind": "linear", "covariate": "exercise"}
            ]
        }"#,
    )
    .unwrap();

    let out = run(&[
        "run",
        "-i",
        data.to_string_lossy().as_ref(),
        "-c",
        config.to_string_lossy().as_ref(),
        "--format",
        "json",
    ]);
    assert!(out.status.success(), "run failed, stderr={}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("stdout should be valid JSON");
    assert_eq!(v.get("n_subjects").and_then(|x| x.as_u64()), Some(1000));
    let ipw = v.get("ipw").expect("ipw estimate");
    let effect = ipw.get("effect").and_then(|x| x.as_f64()).unwrap();
    assert!((effect - 2.0).abs() < 0.3, "effect={}", effect);
    let lower = ipw.get("ci_lower").and_then(|x| x.as_f64()).unwrap();
    let upper = ipw.get("ci_upper").and_then(|x| x.as_f64()).unwrap();
    assert!(lower < effect && effect < upper);
    assert!(v.get("crude").and_then(|c| c.get("effect")).and_then(|x| x.as_f64()).is_some());
    assert!(v.get("balance").and_then(|x| x.as_array()).is_some_and(|b| !b.is_empty()));

    let _ = std::fs::remove_file(&data);
    let _ = std::fs::remove_file(&config);
}

#[test]
fn run_text_with_stabilize_writes_json_report() {
    let data = simulate(400, 7);
    let report = tmp_path("report.json");

    let out = run(&[
        "run",
        "-i",
        data.to_string_lossy().as_ref(),
        "-o",
        report.to_string_lossy().as_ref(),
        "--stabilize",
    ]);
    assert!(out.status.success(), "run failed, stderr={}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("IPW estimate"), "stdout={}", stdout);
    assert!(stdout.contains("Crude"), "stdout={}", stdout);
    assert!(stdout.contains("Marginal"), "stdout={}", stdout);

    let v: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    let mean = v
        .get("weight_summary")
        .and_then(|w| w.get("mean"))
        .and_then(|x| x.as_f64())
        .expect("weight_summary.mean");
    assert!((mean - 1.0).abs() < 0.3, "stabilized mean weight={}", mean);

    let _ = std::fs::remove_file(&data);
    let _ = std::fs::remove_file(&report);
}

#[test]
fn run_missing_input_fails() {
    let missing = tmp_path("does_not_exist.csv");
    let out = run(&["run", "-i", missing.to_string_lossy().as_ref()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("failed to open"), "stderr={}", stderr);
}

#[test]
fn run_all_treated_reports_singular_design() {
    let data = tmp_path("all_treated.csv");
    let mut csv = String::from("seqn,qsmk,wt82_71,age,sex\n");
    for i in 0..20 {
        csv.push_str(&format!("{},1,{},{},{}\n", i + 1, i as f64 * 0.5, 30 + i, i % 2));
    }
    std::fs::write(&data, csv).unwrap();
    let config = tmp_path("config_small.json");
    std::fs::write(
        &config,
        r#"{"terms": [{"kind": "linear", "covariate": "age"}, {"kind": "linear", "covariate": "sex"}]}"#,
    )
    .unwrap();

    let out = run(&[
        "run",
        "-i",
        data.to_string_lossy().as_ref(),
        "-c",
        config.to_string_lossy().as_ref(),
    ]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("singular design"), "stderr={}", stderr);

    let _ = std::fs::remove_file(&data);
    let _ = std::fs::remove_file(&config);
}
