//! Request handlers: the transport-agnostic boundary.
//!
//! Handlers validate required fields, call into the service, and map core
//! errors onto the three-way boundary classification. A transport frames and
//! routes these calls but never needs to understand the payloads.

use tokio::time::Duration;

use hostbridge_protocol::BuildOutcome;
use hostbridge_protocol::BuildParams;
use hostbridge_protocol::DebugAck;
use hostbridge_protocol::EvaluateParams;
use hostbridge_protocol::EvaluatedValue;
use hostbridge_protocol::RequestError;
use hostbridge_protocol::RunList;
use hostbridge_protocol::RunOutputChunk;
use hostbridge_protocol::RunOutputParams;
use hostbridge_protocol::RunStartParams;
use hostbridge_protocol::RunStarted;
use hostbridge_protocol::RunStopParams;
use hostbridge_protocol::RunStopped;
use hostbridge_protocol::StackResponse;
use hostbridge_protocol::TestOutcome;
use hostbridge_protocol::TestParams;
use hostbridge_protocol::VariablesParams;
use hostbridge_protocol::VariablesResponse;

use crate::debug::StepKind;
use crate::error::BridgeError;
use crate::run_registry::StopOutcome;
use crate::service::BridgeService;

type ApiResult<T> = std::result::Result<T, RequestError>;

fn require_text(value: Option<String>, field: &str) -> ApiResult<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(RequestError::invalid_params(
            field,
            format!("{field} is required"),
        )),
    }
}

fn map_err(err: BridgeError) -> RequestError {
    err.into_request_error()
}

pub async fn handle_build(service: &BridgeService, params: BuildParams) -> ApiResult<BuildOutcome> {
    let timeout = params.timeout_seconds.map(Duration::from_secs);
    service
        .build(params.incremental, timeout, params.project_ref)
        .await
        .map_err(map_err)
}

pub async fn handle_test(service: &BridgeService, params: TestParams) -> ApiResult<TestOutcome> {
    let pattern = require_text(params.pattern, "pattern")?;
    let timeout = params.timeout_seconds.map(Duration::from_secs);
    service
        .test(pattern, timeout, params.project_ref)
        .await
        .map_err(map_err)
}

pub async fn handle_start_run(
    service: &BridgeService,
    params: RunStartParams,
) -> ApiResult<RunStarted> {
    let config_name = require_text(params.config_name, "configName")?;
    let run_id = service
        .start_run(&config_name, params.project_ref.as_deref())
        .await
        .map_err(map_err)?;
    Ok(RunStarted {
        success: true,
        run_id,
    })
}

pub async fn handle_run_output(
    service: &BridgeService,
    params: RunOutputParams,
) -> ApiResult<RunOutputChunk> {
    let run_id = require_text(params.run_id, "runId")?;
    let read = service
        .run_output(&run_id, params.clear)
        .await
        .map_err(map_err)?;
    Ok(RunOutputChunk {
        success: true,
        output: read.output,
        running: read.running,
        exit_code: read.exit_code,
    })
}

pub async fn handle_stop_run(
    service: &BridgeService,
    params: RunStopParams,
) -> ApiResult<RunStopped> {
    let run_id = require_text(params.run_id, "runId")?;
    let outcome = service.stop_run(&run_id).await.map_err(map_err)?;
    let message = match outcome {
        StopOutcome::Stopped => format!("termination requested for {run_id}"),
        StopOutcome::AlreadyTerminated => format!("{run_id} had already terminated"),
    };
    Ok(RunStopped {
        success: true,
        message,
    })
}

pub async fn handle_list_runs(service: &BridgeService) -> RunList {
    RunList {
        runs: service.list_runs().await,
    }
}

pub async fn handle_debug_pause(service: &BridgeService) -> ApiResult<DebugAck> {
    service.debug().pause().await.map_err(map_err)?;
    Ok(DebugAck { success: true })
}

pub async fn handle_debug_resume(service: &BridgeService) -> ApiResult<DebugAck> {
    service.debug().resume().await.map_err(map_err)?;
    Ok(DebugAck { success: true })
}

pub async fn handle_debug_step_over(service: &BridgeService) -> ApiResult<DebugAck> {
    service.debug().step(StepKind::Over).await.map_err(map_err)?;
    Ok(DebugAck { success: true })
}

pub async fn handle_debug_step_into(service: &BridgeService) -> ApiResult<DebugAck> {
    service.debug().step(StepKind::Into).await.map_err(map_err)?;
    Ok(DebugAck { success: true })
}

pub async fn handle_debug_step_out(service: &BridgeService) -> ApiResult<DebugAck> {
    service.debug().step(StepKind::Out).await.map_err(map_err)?;
    Ok(DebugAck { success: true })
}

pub async fn handle_debug_evaluate(
    service: &BridgeService,
    params: EvaluateParams,
) -> ApiResult<EvaluatedValue> {
    let expression = require_text(params.expression, "expression")?;
    let evaluation = service
        .debug()
        .evaluate(&expression)
        .await
        .map_err(map_err)?;
    Ok(EvaluatedValue {
        success: true,
        value: evaluation.value,
        type_name: evaluation.type_name,
    })
}

pub async fn handle_debug_stack(service: &BridgeService) -> ApiResult<StackResponse> {
    let frames = service.debug().stack().await.map_err(map_err)?;
    Ok(StackResponse {
        success: true,
        frames,
    })
}

pub async fn handle_debug_variables(
    service: &BridgeService,
    params: VariablesParams,
) -> ApiResult<VariablesResponse> {
    let frame_index = params.frame_index.ok_or_else(|| {
        RequestError::invalid_params("frameIndex", "frameIndex is required")
    })?;
    let variables = service
        .debug()
        .variables(frame_index)
        .await
        .map_err(map_err)?;
    Ok(VariablesResponse {
        success: true,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    use hostbridge_protocol::FaultKind;

    use crate::config::BridgeConfig;
    use crate::debug::ChildrenSink;
    use crate::debug::DebugHost;
    use crate::debug::DebugSessionState;
    use crate::debug::EvalOutcome;
    use crate::dispatch::Completion;
    use crate::host::BuildFinished;
    use crate::host::BuildHost;
    use crate::host::ProjectModel;
    use crate::host::RunSpec;
    use crate::host::TestHost;
    use crate::host::TestProcessExit;
    use crate::service::HostSeams;
    use crate::test_report::TestNode;

    struct ClosedProject;
    impl ProjectModel for ClosedProject {
        fn project_open(&self) -> bool {
            false
        }
        fn resolve_run(
            &self,
            _config_name: &str,
            _project_ref: Option<&str>,
        ) -> anyhow::Result<RunSpec> {
            anyhow::bail!("no project open")
        }
    }

    struct IdleBuildHost;
    impl BuildHost for IdleBuildHost {
        fn compile_in_progress(&self) -> bool {
            false
        }
        fn start_build(
            &self,
            _incremental: bool,
            _project_ref: Option<String>,
            done: Completion<BuildFinished>,
        ) {
            done.resolve(BuildFinished {
                success: true,
                aborted: false,
                errors: Vec::new(),
                warnings: Vec::new(),
            });
        }
    }

    struct IdleTestHost;
    impl TestHost for IdleTestHost {
        fn start_tests(
            &self,
            _pattern: String,
            _project_ref: Option<String>,
            done: Completion<TestProcessExit>,
        ) {
            done.resolve(TestProcessExit {
                exit_code: 0,
                aborted: false,
            });
        }
        fn report(&self) -> anyhow::Result<Option<TestNode>> {
            Ok(None)
        }
    }

    struct NoDebugger;
    impl DebugHost for NoDebugger {
        fn session_state(&self) -> DebugSessionState {
            DebugSessionState::None
        }
        fn pause(&self, _done: Completion<std::result::Result<(), String>>) {}
        fn resume(&self, _done: Completion<std::result::Result<(), String>>) {}
        fn step(
            &self,
            _kind: StepKind,
            _done: Completion<std::result::Result<(), String>>,
        ) {
        }
        fn evaluate(&self, _expression: String, _done: Completion<EvalOutcome>) {}
        fn stack(&self, _sink: ChildrenSink<hostbridge_protocol::StackFrame>) {}
        fn variables(&self, _frame_index: u32, _sink: ChildrenSink<hostbridge_protocol::Variable>) {
        }
    }

    fn closed_project_service() -> BridgeService {
        BridgeService::new(
            BridgeConfig::default(),
            HostSeams {
                project: Arc::new(ClosedProject),
                build: Arc::new(IdleBuildHost),
                test: Arc::new(IdleTestHost),
                debug: Arc::new(NoDebugger),
            },
        )
    }

    #[tokio::test]
    async fn missing_pattern_is_invalid_params_not_internal() {
        let service = closed_project_service();
        let result = handle_test(&service, TestParams::default()).await;
        assert_matches!(
            result,
            Err(RequestError::InvalidParams { field, .. }) if field == "pattern"
        );
    }

    #[tokio::test]
    async fn blank_config_name_is_invalid_params() {
        let service = closed_project_service();
        let params = RunStartParams {
            config_name: Some("   ".to_string()),
            project_ref: None,
        };
        assert_matches!(
            handle_start_run(&service, params).await,
            Err(RequestError::InvalidParams { field, .. }) if field == "configName"
        );
    }

    #[tokio::test]
    async fn closed_project_maps_to_internal_fault() {
        let service = closed_project_service();
        assert_matches!(
            handle_build(&service, BuildParams::default()).await,
            Err(RequestError::Internal {
                fault: FaultKind::NoProjectOpen,
                ..
            })
        );
    }

    #[tokio::test]
    async fn unknown_run_id_maps_to_not_found() {
        let service = closed_project_service();
        let params = RunOutputParams {
            run_id: Some("run-999".to_string()),
            clear: false,
        };
        assert_matches!(
            handle_run_output(&service, params).await,
            Err(RequestError::NotFound { id, .. }) if id == "run-999"
        );
    }

    #[tokio::test]
    async fn debug_without_session_maps_to_its_fault_kind() {
        let service = closed_project_service();
        assert_matches!(
            handle_debug_pause(&service).await,
            Err(RequestError::Internal {
                fault: FaultKind::NoActiveDebugSession,
                ..
            })
        );
        assert_matches!(
            handle_debug_variables(&service, VariablesParams::default()).await,
            Err(RequestError::InvalidParams { field, .. }) if field == "frameIndex"
        );
    }
}
