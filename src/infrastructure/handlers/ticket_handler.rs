use crate::domain::events::{EventEnvelope, event_types};
use crate::domain::ports::{EventHandler, Notification, RoutingError};
use serde_json::{Map, Value};

/// Renders ticket lifecycle events into channel notifications
#[derive(Debug, Default)]
pub struct TicketHandler;

impl TicketHandler {
    pub fn new() -> Self {
        Self
    }
}

fn malformed(envelope: &EventEnvelope, reason: &str) -> RoutingError {
    RoutingError::MalformedPayload {
        event_type: envelope.event_type.clone(),
        reason: reason.to_string(),
    }
}

fn text<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Ticket ids arrive as numbers or strings depending on the source
fn ticket_id(data: &Map<String, Value>) -> Option<String> {
    match data.get("ticketId")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

impl EventHandler for TicketHandler {
    fn event_types(&self) -> Vec<&'static str> {
        vec![
            event_types::TICKET_CREATED,
            event_types::TICKET_UPDATED,
            event_types::TICKET_ASSIGNED,
            event_types::TICKET_CLOSED,
            event_types::TICKET_COMMENT_ADDED,
        ]
    }

    fn render(&self, envelope: &EventEnvelope) -> Result<Notification, RoutingError> {
        let data = envelope
            .data
            .as_object()
            .ok_or_else(|| malformed(envelope, "data is not an object"))?;
        let id = ticket_id(data).ok_or_else(|| malformed(envelope, "missing ticketId"))?;
        let title = text(data, "title").unwrap_or("(untitled)");

        let mut notification = match envelope.event_type.as_str() {
            event_types::TICKET_CREATED => {
                let mut n = Notification::new(format!("New ticket #{id}: {title}"));
                if let Some(priority) = text(data, "priority") {
                    n = n.line(format!("Priority: {priority}"));
                }
                if let Some(author) = text(data, "createdBy") {
                    n = n.line(format!("Opened by {author}"));
                }
                n
            }
            event_types::TICKET_UPDATED => {
                let mut n = Notification::new(format!("Ticket #{id} updated: {title}"));
                if let Some(status) = text(data, "status") {
                    n = n.line(format!("Status: {status}"));
                }
                n
            }
            event_types::TICKET_ASSIGNED => {
                let assignee =
                    text(data, "assignee").ok_or_else(|| malformed(envelope, "missing assignee"))?;
                Notification::new(format!("Ticket #{id} assigned: {title}"))
                    .line(format!("Assigned to {assignee}"))
            }
            event_types::TICKET_CLOSED => {
                let mut n = Notification::new(format!("Ticket #{id} closed: {title}"));
                if let Some(resolution) = text(data, "resolution") {
                    n = n.line(format!("Resolution: {resolution}"));
                }
                n
            }
            event_types::TICKET_COMMENT_ADDED => {
                let comment =
                    text(data, "comment").ok_or_else(|| malformed(envelope, "missing comment"))?;
                let author = text(data, "author").unwrap_or("someone");
                Notification::new(format!("New comment on ticket #{id}: {title}"))
                    .line(format!("{author}: {comment}"))
            }
            other => return Err(malformed(envelope, &format!("not a ticket event: {other}"))),
        };

        if let Some(url) = text(data, "url") {
            notification = notification.with_url(url);
        }
        Ok(notification)
    }

    fn name(&self) -> &'static str {
        "TicketHandler"
    }
}
