//! Remote label store: the trait every stage talks to and its Gmail implementation

use async_stream::try_stream;
use async_trait::async_trait;
use futures::Stream;
use google_gmail1::api::{Label as ApiLabel, ModifyMessageRequest};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::error::{OrganizerError, Result};
use crate::models::{Header, Label, LabelType, MessagePage, MessageRef};
use crate::retry::RetryingCaller;

const USER_ID: &str = "me";
const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// Headers requested in metadata format; everything the classifier reads
pub const METADATA_HEADERS: &[&str] = &["From", "To", "Subject", "List-Unsubscribe"];

/// Operations against the remote mailbox, keyed by opaque ids
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Every label in the account, system labels included
    async fn list_labels(&self) -> Result<Vec<Label>>;

    /// A single label with live message totals
    async fn get_label(&self, label_id: &str) -> Result<Label>;

    async fn create_label(&self, name: &str) -> Result<Label>;

    async fn delete_label(&self, label_id: &str) -> Result<()>;

    /// One page of messages carrying all of `label_ids` (all messages when empty)
    async fn list_messages(
        &self,
        label_ids: &[String],
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage>;

    /// From, To, Subject and List-Unsubscribe headers of a message
    async fn get_message_headers(&self, message_id: &str) -> Result<Vec<Header>>;

    /// Add and remove labels on one message in a single mutation
    async fn modify_message(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()>;
}

/// Walk every page of a listing, yielding message ids
///
/// The stream ends after the first listing error, which it yields.
pub fn message_ids<'a>(
    store: &'a dyn LabelStore,
    label_ids: Vec<String>,
    page_size: u32,
) -> impl Stream<Item = Result<String>> + 'a {
    try_stream! {
        let mut page_token: Option<String> = None;
        loop {
            let page = store
                .list_messages(&label_ids, page_size, page_token.take())
                .await?;

            for message in page.messages {
                yield message.id;
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
    }
}

/// Production store over the Gmail API
///
/// Every call goes through the shared [`RetryingCaller`] and is bounded by a
/// per-attempt timeout that surfaces as a transient network error.
pub struct GmailLabelStore {
    hub: GmailHub,
    caller: RetryingCaller,
    call_timeout: Duration,
}

impl GmailLabelStore {
    pub fn new(hub: GmailHub, caller: RetryingCaller) -> Self {
        Self {
            hub,
            caller,
            call_timeout: Duration::from_secs(30),
        }
    }

    async fn bounded<T, Fut>(&self, operation: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(OrganizerError::from),
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation, self.call_timeout);
                Err(OrganizerError::NetworkError(format!(
                    "{} timed out after {:?}",
                    operation, self.call_timeout
                )))
            }
        }
    }
}

fn convert_label(label: ApiLabel) -> Option<Label> {
    let label_type = LabelType::from_api(label.type_.as_deref());
    let messages_total = label.messages_total.and_then(|t| u32::try_from(t).ok());
    match (label.id, label.name) {
        (Some(id), Some(name)) => Some(Label {
            id,
            name,
            label_type,
            messages_total,
        }),
        _ => None,
    }
}

fn non_empty(ids: &[String]) -> Option<Vec<String>> {
    if ids.is_empty() {
        None
    } else {
        Some(ids.to_vec())
    }
}

#[async_trait]
impl LabelStore for GmailLabelStore {
    async fn list_labels(&self) -> Result<Vec<Label>> {
        self.caller
            .call("list_labels", || async {
                debug!("Calling Gmail API to list labels...");
                let call = self
                    .hub
                    .users()
                    .labels_list(USER_ID)
                    .add_scope(LABELS_SCOPE)
                    .doit();
                let (_, response) = self.bounded("list_labels", call).await?;

                let labels: Vec<Label> = response
                    .labels
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(convert_label)
                    .collect();
                debug!("Successfully parsed {} labels", labels.len());
                Ok(labels)
            })
            .await
    }

    async fn get_label(&self, label_id: &str) -> Result<Label> {
        self.caller
            .call("get_label", || async {
                let call = self
                    .hub
                    .users()
                    .labels_get(USER_ID, label_id)
                    .add_scope(LABELS_SCOPE)
                    .doit();
                let (_, label) = self.bounded("get_label", call).await?;

                convert_label(label).ok_or_else(|| {
                    OrganizerError::LabelError(format!("Label {} returned without id or name", label_id))
                })
            })
            .await
    }

    async fn create_label(&self, name: &str) -> Result<Label> {
        self.caller
            .call("create_label", || async {
                let request = ApiLabel {
                    name: Some(name.to_string()),
                    message_list_visibility: Some("show".to_string()),
                    label_list_visibility: Some("labelShow".to_string()),
                    ..Default::default()
                };

                let call = self
                    .hub
                    .users()
                    .labels_create(request, USER_ID)
                    .add_scope(LABELS_SCOPE)
                    .doit();
                let (_, created) = self.bounded("create_label", call).await?;

                let id = created
                    .id
                    .ok_or_else(|| OrganizerError::LabelError("Created label has no ID".to_string()))?;
                Ok(Label {
                    id,
                    name: created.name.unwrap_or_else(|| name.to_string()),
                    label_type: LabelType::User,
                    messages_total: Some(0),
                })
            })
            .await
    }

    async fn delete_label(&self, label_id: &str) -> Result<()> {
        self.caller
            .call("delete_label", || async {
                let call = self
                    .hub
                    .users()
                    .labels_delete(USER_ID, label_id)
                    .add_scope(LABELS_SCOPE)
                    .doit();
                self.bounded("delete_label", call).await?;
                Ok(())
            })
            .await
    }

    async fn list_messages(
        &self,
        label_ids: &[String],
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        self.caller
            .call("list_messages", || async {
                let mut call = self
                    .hub
                    .users()
                    .messages_list(USER_ID)
                    .max_results(page_size);

                for label_id in label_ids {
                    call = call.add_label_ids(label_id);
                }
                if let Some(token) = page_token.as_deref() {
                    call = call.page_token(token);
                }

                let (_, response) = self
                    .bounded("list_messages", call.add_scope(MODIFY_SCOPE).doit())
                    .await?;

                let messages = response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id.map(|id| MessageRef { id }))
                    .collect();

                Ok(MessagePage {
                    messages,
                    next_page_token: response.next_page_token,
                })
            })
            .await
    }

    async fn get_message_headers(&self, message_id: &str) -> Result<Vec<Header>> {
        self.caller
            .call("get_message", || async {
                let mut call = self
                    .hub
                    .users()
                    .messages_get(USER_ID, message_id)
                    .format("metadata");
                for header in METADATA_HEADERS {
                    call = call.add_metadata_headers(header);
                }

                let (_, message) = self
                    .bounded("get_message", call.add_scope(MODIFY_SCOPE).doit())
                    .await?;

                let headers = message
                    .payload
                    .and_then(|p| p.headers)
                    .ok_or_else(|| {
                        OrganizerError::InvalidMessageFormat(format!(
                            "Message {} has no headers",
                            message_id
                        ))
                    })?;

                Ok(headers
                    .into_iter()
                    .filter_map(|h| match (h.name, h.value) {
                        (Some(name), Some(value)) => Some(Header { name, value }),
                        _ => None,
                    })
                    .collect())
            })
            .await
    }

    async fn modify_message(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        self.caller
            .call("modify_message", || async {
                let request = ModifyMessageRequest {
                    add_label_ids: non_empty(add_label_ids),
                    remove_label_ids: non_empty(remove_label_ids),
                };

                let call = self
                    .hub
                    .users()
                    .messages_modify(request, USER_ID, message_id)
                    .add_scope(MODIFY_SCOPE)
                    .doit();
                self.bounded("modify_message", call).await?;
                Ok(())
            })
            .await
    }
}
