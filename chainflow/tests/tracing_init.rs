//! Global subscriber installation. Kept in its own test binary so the
//! subscriber it installs never reaches other tests.

use chainflow::observability::{init_tracing, LogFormat};

#[test]
fn init_tracing_installs_once() {
    assert!(init_tracing(LogFormat::Json));
    assert!(!init_tracing(LogFormat::Json));
    assert!(!init_tracing(LogFormat::Pretty));
}
