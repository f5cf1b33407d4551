//! Test helpers: an engine over the in-memory store with a small cast of users.
//!
//! Run from workspace root: `cargo test -p flowdesk-services`.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use flowdesk_core::models::{
    CreateStatusTemplateRequest, CreateTemplateRequest, CreateWorkflowRequest, Priority,
    StatusItemInput, TemplateStepInput, Visibility, Workflow, WorkflowStatusTemplate,
    WorkflowTemplate,
};
use flowdesk_core::EngineConfig;
use flowdesk_db::{MemoryStore, WorkflowRepositoryTrait};
use flowdesk_services::{EngineStore, FlowdeskServices, StaticDirectory, WorkflowEngine};

pub struct TestEngine {
    pub services: FlowdeskServices,
    pub memory: MemoryStore,
    /// Directory and team registry the services were built with
    pub directory: Arc<StaticDirectory>,
    /// Creates the template and most workflows
    pub creator: Uuid,
    pub alice: Uuid,
    pub bob: Uuid,
    pub carol: Uuid,
    /// Holds the `admin` role
    pub admin: Uuid,
    /// Known user with no relation to any workflow
    pub outsider: Uuid,
    /// Members: creator, alice, bob
    pub team_id: Uuid,
    pub template: WorkflowTemplate,
}

pub async fn setup_engine() -> TestEngine {
    setup_engine_with(EngineConfig::default()).await
}

pub async fn setup_engine_with(config: EngineConfig) -> TestEngine {
    let creator = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let carol = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    let team_id = Uuid::new_v4();

    let mut directory = StaticDirectory::new();
    directory
        .add_user(creator, "Creator", &["member"])
        .add_user(alice, "Alice", &["member"])
        .add_user(bob, "Bob", &["member"])
        .add_user(carol, "Carol", &["member"])
        .add_user(admin, "Admin", &["admin"])
        .add_user(outsider, "Olive", &["member"])
        .add_team(team_id, &[creator, alice, bob]);
    let directory = Arc::new(directory);

    let memory = MemoryStore::new();
    let store = EngineStore::in_memory(memory.clone(), StdDuration::from_secs(5));
    let services = FlowdeskServices::new(store, directory.clone(), directory.clone(), &config);

    let template = services
        .engine
        .templates()
        .create_template(
            template_request("Purchase approval", &["Draft", "Review", "Approve"]),
            creator,
        )
        .await
        .expect("create template");

    TestEngine {
        services,
        memory,
        directory,
        creator,
        alice,
        bob,
        carol,
        admin,
        outsider,
        team_id,
        template,
    }
}

pub fn template_request(name: &str, steps: &[&str]) -> CreateTemplateRequest {
    CreateTemplateRequest {
        name: name.to_string(),
        description: None,
        visibility: Visibility::Public,
        team_id: None,
        steps: steps
            .iter()
            .enumerate()
            .map(|(i, step)| TemplateStepInput {
                name: step.to_string(),
                description: None,
                step_order: i as i32 + 1,
            })
            .collect(),
    }
}

pub fn status_item(name: &str, order_index: i32, is_initial: bool) -> StatusItemInput {
    StatusItemInput {
        name: name.to_string(),
        color: Some("#3366ff".to_string()),
        order_index,
        is_initial,
        is_final: false,
    }
}

impl TestEngine {
    pub fn engine(&self) -> &WorkflowEngine {
        &self.services.engine
    }

    pub fn request(&self, assign_to: Uuid) -> CreateWorkflowRequest {
        CreateWorkflowRequest {
            template_id: self.template.id,
            title: "Buy laptops".to_string(),
            description: Some("Ten units for the new hires".to_string()),
            priority: Priority::Medium,
            visibility: Visibility::Public,
            deadline: Some(Utc::now() + Duration::hours(1)),
            team_id: None,
            status_template_id: None,
            assign_to,
        }
    }

    /// Workflow on the 3-step template, created by `creator`, step 1 assigned to alice.
    pub async fn create_workflow(&self) -> Workflow {
        self.engine()
            .create_workflow(self.request(self.alice), self.creator)
            .await
            .expect("create workflow")
    }

    pub async fn create_status_template(&self) -> WorkflowStatusTemplate {
        self.engine()
            .statuses()
            .create_status_template(
                CreateStatusTemplateRequest {
                    name: "Review board".to_string(),
                    description: None,
                    items: vec![
                        status_item("Open", 1, true),
                        status_item("Blocked", 2, false),
                        status_item("Done", 3, false),
                    ],
                },
                self.creator,
            )
            .await
            .expect("create status template")
    }

    /// Overwrite the deadline directly in the store, bypassing the future-deadline check.
    pub async fn force_deadline(&self, workflow_id: Uuid, deadline: Option<DateTime<Utc>>) {
        let mut workflow = self
            .memory
            .get_workflow(workflow_id)
            .await
            .unwrap()
            .expect("workflow exists");
        workflow.deadline = deadline;
        let version = workflow.updated_at;
        self.memory
            .update_workflow_details(&workflow, version)
            .await
            .unwrap();
    }
}
