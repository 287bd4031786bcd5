//! Assistant messages for each agent route.
//!
//! Every message starts with the role directive (`@bmad/<role>.mdc`), which
//! loads the template installed into the project by the toolchain setup,
//! followed by the request's document paths and a common closing note.

use am_core::types::AgentRole;

const CLOSING: &str = "Notes: always answer in Chinese and write document content in Chinese \
(proper nouns, code and short English terms excepted). If the target documents already exist \
and are complete, summarise them instead of regenerating and leave them unchanged.";

const PROJECT_CONVENTIONS: &str = "Keep the project's conventions in mind:\n\
1. Backend layering is handler -> service -> repository, wired through the dependency container.\n\
2. Services and repositories expose interfaces defined next to their implementation.\n\
3. See @backend/ReadMe.md and @frontend/ReadMe.md for the purpose of each folder.\n\
4. Understand the existing shared components before changing code; do not add frameworks.";

fn compose(role: AgentRole, body: &str) -> String {
    format!("{} {body}\n{CLOSING}", role.directive())
}

/// Document references handed to the developer role for a story.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoryRefs<'a> {
    pub prd_path: &'a str,
    pub arch_folder: &'a str,
    pub db_folder: &'a str,
    pub api_folder: &'a str,
    pub ux_spec_path: &'a str,
    pub epic_file: &'a str,
    pub story_file: &'a str,
}

pub fn project_brief(requirements: &str) -> String {
    compose(
        AgentRole::Analyst,
        &format!(
            "Write a project brief, then run market research. Put both documents under \
             @docs/analyse/. My requirements are:\n{requirements}"
        ),
    )
}

pub fn prd(requirements: &str) -> String {
    compose(
        AgentRole::Pm,
        &format!(
            "Write the PRD for my requirements to docs/PRD.md. Keep deployment, business model, \
             success metrics and market risk sections brief; technology choices and theme colours \
             are decided later with the architect and the UX expert. My requirements are:\n\
             {requirements}"
        ),
    )
}

pub fn ux_standard(requirements: &str, prd_path: &str) -> String {
    compose(
        AgentRole::UxExpert,
        &format!(
            "Based on the PRD @{prd_path}, write the UX specification to docs/ux/ux-spec.md. \
             Additional requirements:\n{requirements}"
        ),
    )
}

pub fn architecture(prd_path: &str, ux_spec_path: &str, template_arch_description: &str) -> String {
    compose(
        AgentRole::Architect,
        &format!(
            "Based on the PRD @{prd_path} and the UX specification @{ux_spec_path}, design the \
             overall, frontend and backend architecture and write them under docs/arch/.\n\
             The project was generated from a template with this architecture:\n\
             {template_arch_description}"
        ),
    )
}

pub fn data_model(prd_path: &str, arch_folder: &str, stories_folder: &str) -> String {
    compose(
        AgentRole::Architect,
        &format!(
            "Based on the PRD @{prd_path}, the architecture in @{arch_folder} and the stories in \
             @{stories_folder}, define the data model and write it under docs/db/."
        ),
    )
}

pub fn api_definition(prd_path: &str, db_folder: &str, stories_folder: &str) -> String {
    compose(
        AgentRole::Architect,
        &format!(
            "Based on the PRD @{prd_path}, the data model in @{db_folder} and the stories in \
             @{stories_folder}, define the API and write it under docs/api/."
        ),
    )
}

pub fn epics_and_stories(prd_path: &str, arch_folder: &str) -> String {
    compose(
        AgentRole::Po,
        &format!(
            "Based on the PRD @{prd_path} and the architecture in @{arch_folder}, create the epics \
             and user stories under docs/epics/ and docs/stories/."
        ),
    )
}

pub fn implement_story(refs: &StoryRefs<'_>) -> String {
    let story = if refs.story_file.is_empty() {
        "every story".to_string()
    } else {
        format!("the story @{}", refs.story_file)
    };
    compose(
        AgentRole::Dev,
        &format!(
            "{PROJECT_CONVENTIONS}\nImplement {story} of the epic @{epic}. References: PRD @{prd}, \
             architecture @{arch}, data model @{db}, API @{api}, UX @{ux}.\nWhen done, build the \
             project, verify the acceptance criteria and tick them in the story document.",
            epic = refs.epic_file,
            prd = refs.prd_path,
            arch = refs.arch_folder,
            db = refs.db_folder,
            api = refs.api_folder,
            ux = refs.ux_spec_path,
        ),
    )
}

pub fn fix_bug(bug_description: &str) -> String {
    compose(
        AgentRole::Dev,
        &format!(
            "{PROJECT_CONVENTIONS}\nThe architecture, API, data model and UX documents under docs/ \
             describe the project. Fix this problem:\n{bug_description}"
        ),
    )
}

pub fn run_test() -> String {
    compose(
        AgentRole::Dev,
        "Run the project's existing test scripts, including the frontend lint and the backend \
         tests. If a `make test` target exists, run it directly. Fix failures you find.",
    )
}

/// Free-form turn with any role.
pub fn chat(role: AgentRole, message: &str) -> String {
    format!("{} {message}", role.directive())
}

/// Asks the developer role to repair a failed build or run step.
pub fn deploy_repair(command: &str, stderr: &str) -> String {
    compose(
        AgentRole::Dev,
        &format!(
            "Running `{command}` in the project failed with:\n{stderr}\nFix the cause, then run \
             `{command}` again and confirm it succeeds."
        ),
    )
}
