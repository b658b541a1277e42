use std::process::ExitCode;

use tracing::error;
use wakedesk_lib::engine::{EngineError, EngineResult};
use wakedesk_lib::observability::init_tracing;
use wakedesk_lib::vault::keychain::{remember_master_password, resolve_master_password};
use wakedesk_lib::AppState;

fn prompt_password() -> EngineResult<String> {
    Ok(rpassword::prompt_password("Master password: ")?)
}

async fn run(state: &AppState, target: Option<String>) -> EngineResult<()> {
    let targets = state.store.load_config()?;
    let Some(target) = target else {
        for t in &targets {
            println!("{}", t.name);
        }
        return Ok(());
    };

    let source = state.secret_source.as_deref();
    let password = resolve_master_password(source, prompt_password)?;
    let vault = state.store.open(&password)?;
    remember_master_password(source, &password);

    let report = state.orchestrator.wake_and_connect(&vault, &target).await?;
    println!("{:?}", report.wait);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let state = AppState::default();
    let target = std::env::args().nth(1);

    match run(&state, target).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if matches!(e, EngineError::AuthFailed) {
                if let Some(source) = state.secret_source.as_deref() {
                    let _ = source.delete();
                }
            }
            error!(error = %e, "run failed");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
