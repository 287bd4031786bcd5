use std::sync::Arc;

use am_core::types::{AgentExecutePayload, AgentRole, CliTool, DevStage};
use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crate::api_error::ApiError;
use crate::api_response::{ApiResponse, TaskCreated};
use crate::prompts::{self, StoryRefs};

use super::state::ApiState;
use super::types::{
    ApiDefinitionReq, ArchitectReq, ChatReq, DatabaseReq, EpicsAndStoriesReq, FixBugReq,
    ImplStoryReq, RequirementsReq, RunTestReq, UxStandardReq, Validate,
};

pub(crate) type Created = Result<Json<ApiResponse<TaskCreated>>, ApiError>;

/// Decode and validate a JSON body, turning every rejection into a
/// business-level validation error.
pub(crate) fn accept<T: Validate>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(req) = body?;
    req.validate()?;
    Ok(req)
}

struct Turn {
    project_guid: String,
    role: AgentRole,
    stage: DevStage,
    message: String,
    cli_tool: Option<CliTool>,
}

async fn submit(state: &ApiState, turn: Turn, created: &str) -> Created {
    let task_id = state
        .dispatcher
        .enqueue_agent(AgentExecutePayload {
            project_guid: turn.project_guid,
            agent_role: turn.role,
            message: turn.message,
            dev_stage: turn.stage,
            cli_tool: turn.cli_tool,
        })
        .await?;
    Ok(ApiResponse::success(created, TaskCreated { task_id }))
}

/// POST /api/v1/agent/analyse/project-brief
pub(crate) async fn project_brief(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<RequirementsReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let turn = Turn {
        message: prompts::project_brief(&req.requirements),
        project_guid: req.project_guid,
        role: AgentRole::Analyst,
        stage: DevStage::CheckRequirement,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "project brief task created").await
}

/// POST /api/v1/agent/pm/prd
pub(crate) async fn prd(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<RequirementsReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let turn = Turn {
        message: prompts::prd(&req.requirements),
        project_guid: req.project_guid,
        role: AgentRole::Pm,
        stage: DevStage::GeneratePrd,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "prd task created").await
}

/// POST /api/v1/agent/ux-expert/ux-standard
pub(crate) async fn ux_standard(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<UxStandardReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let turn = Turn {
        message: prompts::ux_standard(&req.requirements, &req.prd_path),
        project_guid: req.project_guid,
        role: AgentRole::UxExpert,
        stage: DevStage::DefineUxStandard,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "ux standard task created").await
}

/// POST /api/v1/agent/architect/architect
pub(crate) async fn architecture(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<ArchitectReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let turn = Turn {
        message: prompts::architecture(
            &req.prd_path,
            &req.ux_spec_path,
            &req.template_arch_description,
        ),
        project_guid: req.project_guid,
        role: AgentRole::Architect,
        stage: DevStage::DesignArchitecture,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "architecture task created").await
}

/// POST /api/v1/agent/architect/database
pub(crate) async fn database(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<DatabaseReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let turn = Turn {
        message: prompts::data_model(&req.prd_path, &req.arch_folder, &req.stories_folder),
        project_guid: req.project_guid,
        role: AgentRole::Architect,
        stage: DevStage::DefineDataModel,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "data model task created").await
}

/// POST /api/v1/agent/architect/apidefinition
pub(crate) async fn api_definition(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<ApiDefinitionReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let turn = Turn {
        message: prompts::api_definition(&req.prd_path, &req.db_folder, &req.stories_folder),
        project_guid: req.project_guid,
        role: AgentRole::Architect,
        stage: DevStage::DefineApi,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "api definition task created").await
}

/// POST /api/v1/agent/po/epicsandstories
pub(crate) async fn epics_and_stories(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<EpicsAndStoriesReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let turn = Turn {
        message: prompts::epics_and_stories(&req.prd_path, &req.arch_folder),
        project_guid: req.project_guid,
        role: AgentRole::Po,
        stage: DevStage::PlanEpicAndStory,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "epics and stories task created").await
}

/// POST /api/v1/agent/dev/implstory
pub(crate) async fn implement_story(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<ImplStoryReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let message = prompts::implement_story(&StoryRefs {
        prd_path: &req.prd_path,
        arch_folder: &req.arch_folder,
        db_folder: &req.db_folder,
        api_folder: &req.api_folder,
        ux_spec_path: &req.ux_spec_path,
        epic_file: &req.epic_file,
        story_file: &req.story_file,
    });
    let turn = Turn {
        message,
        project_guid: req.project_guid,
        role: AgentRole::Dev,
        stage: DevStage::DevelopStory,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "story implementation task created").await
}

/// POST /api/v1/agent/dev/fixbug
pub(crate) async fn fix_bug(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<FixBugReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let turn = Turn {
        message: prompts::fix_bug(&req.bug_description),
        project_guid: req.project_guid,
        role: AgentRole::Dev,
        stage: DevStage::FixBug,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "bug fix task created").await
}

/// POST /api/v1/agent/dev/runtest
pub(crate) async fn run_test(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<RunTestReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let turn = Turn {
        message: prompts::run_test(),
        project_guid: req.project_guid,
        role: AgentRole::Dev,
        stage: DevStage::RunTest,
        cli_tool: req.cli_tool,
    };
    submit(&state, turn, "test task created").await
}

/// POST /api/v1/agent/chat
pub(crate) async fn chat(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<ChatReq>, JsonRejection>,
) -> Created {
    let req = accept(body)?;
    let task_id = state
        .dispatcher
        .enqueue_chat(AgentExecutePayload {
            message: prompts::chat(req.agent_role, &req.message),
            dev_stage: req
                .dev_stage
                .unwrap_or_else(|| req.agent_role.default_dev_stage()),
            project_guid: req.project_guid,
            agent_role: req.agent_role,
            cli_tool: req.cli_tool,
        })
        .await?;
    Ok(ApiResponse::success("chat task created", TaskCreated { task_id }))
}
