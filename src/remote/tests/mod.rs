//! Unit tests for the remote client.

mod command;
mod execution;
mod util;

use rstest::fixture;

use super::RemoteClient;
use crate::test_support::{RecordingSleeper, ScriptedRunner, ssh_config};

type TestClient = RemoteClient<ScriptedRunner, RecordingSleeper>;

#[fixture]
fn harness() -> (TestClient, ScriptedRunner, RecordingSleeper) {
    let runner = ScriptedRunner::new();
    let sleeper = RecordingSleeper::new();
    let client = RemoteClient::new(ssh_config(), runner.clone())
        .expect("config should validate")
        .with_sleeper(sleeper.clone());
    (client, runner, sleeper)
}
