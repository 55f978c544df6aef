#![forbid(unsafe_code)]

use proptest::test_runner::{Config as ProptestConfig, RngAlgorithm, TestRng, TestRunner};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub const TEST_LOG_SCHEMA_VERSION: &str = "canontype.test-log.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    Unit,
    Property,
    Conformance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestLogEnv {
    pub os: String,
    pub cargo_target_dir: String,
    pub timestamp_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TestPhaseTimings {
    pub execute_ms: u64,
    pub verify_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestLogV1 {
    pub schema_version: String,
    pub test_id: String,
    pub fixture_id: String,
    pub seed: Option<u64>,
    pub mode: TestMode,
    pub env: TestLogEnv,
    pub result: TestResult,
    pub duration_ms: u64,
    pub details: Option<String>,
    pub phase_timings: TestPhaseTimings,
}

impl TestLogV1 {
    #[must_use]
    pub fn unit(
        test_id: impl Into<String>,
        fixture_id: impl Into<String>,
        mode: TestMode,
        result: TestResult,
    ) -> Self {
        Self {
            schema_version: TEST_LOG_SCHEMA_VERSION.to_owned(),
            test_id: test_id.into(),
            fixture_id: fixture_id.into(),
            seed: capture_proptest_seed(),
            mode,
            env: capture_env(),
            result,
            duration_ms: 0,
            details: None,
            phase_timings: TestPhaseTimings::default(),
        }
    }
}

#[must_use]
pub fn capture_env() -> TestLogEnv {
    TestLogEnv {
        os: std::env::consts::OS.to_owned(),
        cargo_target_dir: std::env::var("CARGO_TARGET_DIR")
            .unwrap_or_else(|_| "<default>".to_owned()),
        timestamp_unix_ms: now_unix_ms_u64(),
    }
}

pub fn fixture_id_from_json<T: Serialize>(fixture: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(fixture)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[must_use]
pub fn property_test_case_count() -> u32 {
    if let Ok(raw) = std::env::var("CT_PROPTEST_CASES")
        && let Ok(parsed) = raw.parse::<u32>()
        && parsed > 0
    {
        return parsed;
    }

    if std::env::var_os("CI").is_some() {
        1024
    } else {
        256
    }
}

#[must_use]
pub fn capture_proptest_seed() -> Option<u64> {
    if let Ok(raw) = std::env::var("CT_PROPTEST_SEED")
        && let Ok(seed) = raw.parse::<u64>()
    {
        return Some(seed);
    }

    if let Ok(raw) = std::env::var("PROPTEST_RNG_SEED")
        && let Ok(seed) = raw.parse::<u64>()
    {
        return Some(seed);
    }

    None
}

/// Property-test runner sized by [`property_test_case_count`]. When a seed is
/// set through [`capture_proptest_seed`] the run is deterministic.
#[must_use]
pub fn property_runner() -> TestRunner {
    let config = ProptestConfig::with_cases(property_test_case_count());
    match capture_proptest_seed() {
        Some(seed) => {
            let mut bytes = [0_u8; 32];
            bytes[..8].copy_from_slice(&seed.to_le_bytes());
            TestRunner::new_with_rng(config, TestRng::from_seed(RngAlgorithm::ChaCha, &bytes))
        }
        None => TestRunner::new(config),
    }
}

#[must_use]
pub fn test_id(module_path: &str, test_name: &str) -> String {
    format!("{module_path}::{test_name}")
}

/// Directory structured logs are written to, when log capture is enabled.
///
/// Logs are only persisted when `CT_TEST_LOG_DIR` is set; test runs without
/// it stay free of filesystem side effects.
#[must_use]
pub fn log_dir() -> Option<PathBuf> {
    std::env::var_os("CT_TEST_LOG_DIR").map(PathBuf::from)
}

pub fn write_log(dir: &Path, log: &TestLogV1) -> Result<PathBuf, String> {
    fs::create_dir_all(dir).map_err(|err| format!("log dir create failed: {err}"))?;
    let path = dir.join(format!("{}.json", log.test_id.replace("::", "__")));
    let payload =
        serde_json::to_string_pretty(log).map_err(|err| format!("log serialize failed: {err}"))?;
    fs::write(&path, payload).map_err(|err| format!("log write failed: {err}"))?;
    Ok(path)
}

/// Runs `body` under a structured log record, re-raising any failure after
/// the record has been written.
pub fn run_logged<Fixture, F>(test_id: &str, fixture: &Fixture, mode: TestMode, body: F)
where
    Fixture: Serialize,
    F: FnOnce() -> Result<(), String>,
{
    let overall_start = Instant::now();
    let fixture_id = fixture_id_from_json(fixture).unwrap_or_else(|err| format!("<{err}>"));
    let mut log = TestLogV1::unit(test_id, fixture_id, mode, TestResult::Fail);

    let execute_start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(body));
    log.phase_timings.execute_ms = duration_ms(execute_start);

    let verify_start = Instant::now();
    let mut panic_payload: Option<Box<dyn Any + Send>> = None;
    match outcome {
        Ok(Ok(())) => log.result = TestResult::Pass,
        Ok(Err(detail)) => log.details = Some(detail),
        Err(payload) => {
            log.details = Some(panic_payload_to_string(payload.as_ref()));
            panic_payload = Some(payload);
        }
    }
    log.phase_timings.verify_ms = duration_ms(verify_start);
    log.duration_ms = duration_ms(overall_start);

    if let Some(dir) = log_dir()
        && let Err(err) = write_log(&dir, &log)
    {
        panic!("test log write failed for {test_id}: {err}");
    }

    if let Some(payload) = panic_payload {
        std::panic::resume_unwind(payload);
    }
    if log.result == TestResult::Fail {
        panic!("{}", log.details.unwrap_or_default());
    }
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return (*msg).to_owned();
    }
    "non-string panic payload".to_owned()
}

fn duration_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn now_unix_ms_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|duration| u64::try_from(duration.as_millis()).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{
        TEST_LOG_SCHEMA_VERSION, TestLogV1, TestMode, TestResult, fixture_id_from_json,
        property_runner, property_test_case_count, run_logged, test_id, write_log,
    };
    use tempfile::tempdir;

    #[test]
    fn test_fixture_digest_deterministic_json() {
        let fixture = serde_json::json!({
            "target": "Tensor",
            "dims": [2, 3]
        });
        let digest_a = fixture_id_from_json(&fixture).expect("digest should build");
        let digest_b = fixture_id_from_json(&fixture).expect("digest should build");
        assert_eq!(digest_a, digest_b);
        assert_eq!(digest_a.len(), 64);
    }

    #[test]
    fn test_property_case_count_has_default_floor() {
        assert!(property_test_case_count() >= 1);
    }

    #[test]
    fn test_log_schema_round_trip_serialization() {
        let log = TestLogV1::unit(
            test_id(module_path!(), "test_log_schema_round_trip_serialization"),
            "fixture-id",
            TestMode::Unit,
            TestResult::Pass,
        );
        let encoded = serde_json::to_string(&log).expect("serialize should work");
        assert!(encoded.contains("\"mode\":\"unit\""));
        let decoded: TestLogV1 = serde_json::from_str(&encoded).expect("deserialize should work");
        assert_eq!(decoded.schema_version, TEST_LOG_SCHEMA_VERSION);
    }

    #[test]
    fn write_log_uses_flattened_test_id_as_file_name() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path().join("logs");
        let log = TestLogV1::unit("a::b::c", "fixture", TestMode::Property, TestResult::Skip);
        let path = write_log(&dir, &log).expect("log write");
        assert!(path.ends_with("a__b__c.json"));
        let written = std::fs::read_to_string(&path).expect("read back");
        assert!(written.contains(TEST_LOG_SCHEMA_VERSION));
    }

    #[test]
    fn run_logged_passes_through_success() {
        run_logged("ct_test_utils::ok", &("ok", 1_u32), TestMode::Unit, || Ok(()));
    }

    #[test]
    #[should_panic(expected = "deliberate")]
    fn run_logged_reraises_reported_failures() {
        run_logged("ct_test_utils::err", &("err", 1_u32), TestMode::Unit, || {
            Err("deliberate".to_owned())
        });
    }

    #[test]
    fn property_runner_uses_configured_case_count() {
        let runner = property_runner();
        assert_eq!(runner.config().cases, property_test_case_count());
    }
}
