//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_organizer::client::LabelStore;
use gmail_organizer::config::Config;
use gmail_organizer::error::{OrganizerError, Result};
use gmail_organizer::models::{Header, Label, LabelType, MessagePage, MessageRef};
use mockall::mock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Mutex;

/// Headers of a message as the metadata endpoint returns them
pub fn headers(from: &str, to: &str, subject: &str) -> Vec<Header> {
    vec![
        Header::new("From", from),
        Header::new("To", to),
        Header::new("Subject", subject),
    ]
}

pub fn newsletter_headers(from: &str, subject: &str) -> Vec<Header> {
    let mut h = headers(from, "me@example.com", subject);
    h.push(Header::new("List-Unsubscribe", "<mailto:unsubscribe@example.com>"));
    h
}

/// Configuration writing every artifact under `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.output.directory = dir.to_path_buf();
    config.api.batch_size = 2;
    config
}

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub headers: Vec<Header>,
    pub label_ids: BTreeSet<String>,
}

#[derive(Default)]
struct FakeState {
    labels: Vec<Label>,
    messages: BTreeMap<String, FakeMessage>,
    next_label: usize,
    fail_modify: HashSet<String>,
    fail_headers: HashSet<String>,
    fail_lookup: HashSet<String>,
    fail_create: HashSet<String>,
    fail_listing_for: HashSet<String>,
    deleted: Vec<String>,
    created: Vec<String>,
    modify_calls: usize,
}

/// In-memory mailbox with per-call failure injection
///
/// Page tokens are the last message id returned, so pagination stays
/// stable while messages are being relabeled.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user label and return its id
    pub fn with_label(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_label += 1;
        let id = format!("Label_{}", state.next_label);
        state.labels.push(Label::user(&id, name));
        id
    }

    pub fn with_system_label(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.labels.push(Label::system(name, name));
        name.to_string()
    }

    /// Add a message carrying the named labels, which must exist
    pub fn add_message(&self, id: &str, headers: Vec<Header>, label_names: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let label_ids = label_names
            .iter()
            .map(|name| {
                state
                    .labels
                    .iter()
                    .find(|l| l.name == *name)
                    .map(|l| l.id.clone())
                    .unwrap_or_else(|| panic!("unknown label {}", name))
            })
            .collect();
        state
            .messages
            .insert(id.to_string(), FakeMessage { headers, label_ids });
    }

    pub fn fail_modify_for(&self, message_id: &str) {
        self.state.lock().unwrap().fail_modify.insert(message_id.to_string());
    }

    pub fn fail_headers_for(&self, message_id: &str) {
        self.state.lock().unwrap().fail_headers.insert(message_id.to_string());
    }

    pub fn fail_lookup_for(&self, label_id: &str) {
        self.state.lock().unwrap().fail_lookup.insert(label_id.to_string());
    }

    pub fn fail_create_for(&self, name: &str) {
        self.state.lock().unwrap().fail_create.insert(name.to_string());
    }

    /// Message listings filtered by this label id fail
    pub fn fail_listing_for(&self, label_id: &str) {
        self.state.lock().unwrap().fail_listing_for.insert(label_id.to_string());
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.labels.iter().find(|l| l.name == name).map(|l| l.id.clone())
    }

    pub fn label_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.labels.iter().map(|l| l.name.clone()).collect()
    }

    /// Names of the labels a message carries, sorted
    pub fn labels_of(&self, message_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.messages[message_id]
            .label_ids
            .iter()
            .filter_map(|id| state.labels.iter().find(|l| &l.id == id))
            .map(|l| l.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn modify_calls(&self) -> usize {
        self.state.lock().unwrap().modify_calls
    }

    fn total_for(state: &FakeState, label_id: &str) -> u32 {
        state
            .messages
            .values()
            .filter(|m| m.label_ids.contains(label_id))
            .count() as u32
    }
}

#[async_trait]
impl LabelStore for FakeStore {
    async fn list_labels(&self) -> Result<Vec<Label>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .labels
            .iter()
            .map(|l| l.clone().with_total(Self::total_for(&state, &l.id)))
            .collect())
    }

    async fn get_label(&self, label_id: &str) -> Result<Label> {
        let state = self.state.lock().unwrap();
        if state.fail_lookup.contains(label_id) {
            return Err(OrganizerError::ServerError {
                status: 503,
                message: "lookup unavailable".to_string(),
            });
        }
        state
            .labels
            .iter()
            .find(|l| l.id == label_id)
            .map(|l| l.clone().with_total(Self::total_for(&state, label_id)))
            .ok_or_else(|| OrganizerError::NotFound(label_id.to_string()))
    }

    async fn create_label(&self, name: &str) -> Result<Label> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create.contains(name) {
            return Err(OrganizerError::Forbidden(format!("cannot create {}", name)));
        }
        if state.labels.iter().any(|l| l.name == name) {
            return Err(OrganizerError::Conflict(format!("{} exists", name)));
        }
        state.next_label += 1;
        let label = Label::user(&format!("Label_{}", state.next_label), name);
        state.labels.push(label.clone());
        state.created.push(name.to_string());
        Ok(label)
    }

    async fn delete_label(&self, label_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .labels
            .iter()
            .position(|l| l.id == label_id)
            .ok_or_else(|| OrganizerError::NotFound(label_id.to_string()))?;
        let label = state.labels.remove(index);
        for message in state.messages.values_mut() {
            message.label_ids.remove(label_id);
        }
        state.deleted.push(label.name);
        Ok(())
    }

    async fn list_messages(
        &self,
        label_ids: &[String],
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let state = self.state.lock().unwrap();
        if label_ids.iter().any(|id| state.fail_listing_for.contains(id)) {
            return Err(OrganizerError::BadRequest("listing refused".to_string()));
        }

        let matching: Vec<&String> = state
            .messages
            .iter()
            .filter(|(id, _)| page_token.as_ref().map_or(true, |after| *id > after))
            .filter(|(_, m)| label_ids.iter().all(|l| m.label_ids.contains(l)))
            .map(|(id, _)| id)
            .collect();

        let page: Vec<MessageRef> = matching
            .iter()
            .take(page_size as usize)
            .map(|id| MessageRef { id: id.to_string() })
            .collect();
        let next_page_token = if matching.len() > page.len() {
            page.last().map(|m| m.id.clone())
        } else {
            None
        };

        Ok(MessagePage {
            messages: page,
            next_page_token,
        })
    }

    async fn get_message_headers(&self, message_id: &str) -> Result<Vec<Header>> {
        let state = self.state.lock().unwrap();
        if state.fail_headers.contains(message_id) {
            return Err(OrganizerError::InvalidMessageFormat(message_id.to_string()));
        }
        state
            .messages
            .get(message_id)
            .map(|m| m.headers.clone())
            .ok_or_else(|| OrganizerError::NotFound(message_id.to_string()))
    }

    async fn modify_message(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.modify_calls += 1;
        if state.fail_modify.contains(message_id) {
            return Err(OrganizerError::BadRequest(format!("cannot modify {}", message_id)));
        }
        let message = state
            .messages
            .get_mut(message_id)
            .ok_or_else(|| OrganizerError::NotFound(message_id.to_string()))?;
        for id in add_label_ids {
            message.label_ids.insert(id.clone());
        }
        for id in remove_label_ids {
            message.label_ids.remove(id);
        }
        Ok(())
    }
}

/// Label fixture with an explicit total
pub fn user_label(id: &str, name: &str, total: u32) -> Label {
    Label {
        id: id.to_string(),
        name: name.to_string(),
        label_type: LabelType::User,
        messages_total: Some(total),
    }
}

// Mock implementation of LabelStore for interaction tests
mock! {
    pub LabelStore {}

    #[async_trait::async_trait]
    impl LabelStore for LabelStore {
        async fn list_labels(&self) -> Result<Vec<Label>>;
        async fn get_label(&self, label_id: &str) -> Result<Label>;
        async fn create_label(&self, name: &str) -> Result<Label>;
        async fn delete_label(&self, label_id: &str) -> Result<()>;
        async fn list_messages(
            &self,
            label_ids: &[String],
            page_size: u32,
            page_token: Option<String>,
        ) -> Result<MessagePage>;
        async fn get_message_headers(&self, message_id: &str) -> Result<Vec<Header>>;
        async fn modify_message(
            &self,
            message_id: &str,
            add_label_ids: &[String],
            remove_label_ids: &[String],
        ) -> Result<()>;
    }
}
