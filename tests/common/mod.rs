use renewables::{
    config::RenewablesConfig,
    session::Session,
    util::test_util::{setup_test_tracing, write_fixtures, TracingGuards},
};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub config: RenewablesConfig,
    _guards: TracingGuards,
}

pub fn setup_fixture(test_name: &str, with_gdp: bool) -> Fixture {
    let guards = setup_test_tracing(test_name);
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixtures(dir.path(), with_gdp).unwrap();
    Fixture {
        dir,
        config,
        _guards: guards,
    }
}

#[allow(dead_code)]
pub fn setup_session(test_name: &str, with_gdp: bool) -> (Session, Fixture) {
    let fixture = setup_fixture(test_name, with_gdp);
    (Session::new(fixture.config.clone()), fixture)
}
