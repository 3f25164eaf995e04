//! Bounded history window sent to the model on each Agent call.

use concierge_rs_protocol::{Message, Role};

/// Size of a message in window budget units.
pub trait SizeMetric: Send + Sync {
    fn size(&self, message: &Message) -> usize;
}

/// Every message costs one unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCount;

impl SizeMetric for MessageCount {
    fn size(&self, _message: &Message) -> usize {
        1
    }
}

/// Keeps the most recent messages that fit a budget.
///
/// A leading system message is always kept. The window starts on a system or
/// human message and ends on a human, tool or assistant message; when the
/// budget alone would break those rules the window grows backward to the
/// nearest human message, so a reply is never separated from the request
/// that produced it.
#[derive(Debug, Clone)]
pub struct MessageWindow<M = MessageCount> {
    budget: usize,
    metric: M,
}

impl MessageWindow<MessageCount> {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            metric: MessageCount,
        }
    }
}

impl<M: SizeMetric> MessageWindow<M> {
    pub fn with_metric(budget: usize, metric: M) -> Self {
        Self { budget, metric }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn trim(&self, history: &[Message]) -> Vec<Message> {
        let Some(end) = window_end(history) else {
            return leading_system(history).cloned().into_iter().collect();
        };
        let system = leading_system(history);
        let floor = usize::from(system.is_some());
        if end <= floor {
            return system.cloned().into_iter().collect();
        }

        let mut remaining = self
            .budget
            .saturating_sub(system.map_or(0, |message| self.metric.size(message)));
        // The newest message is always part of the window.
        let mut start = end - 1;
        remaining = remaining.saturating_sub(self.metric.size(&history[start]));
        while start > floor {
            let size = self.metric.size(&history[start - 1]);
            if size > remaining {
                break;
            }
            remaining -= size;
            start -= 1;
        }
        let start = align_start(history, floor, start, end);

        let mut window = Vec::with_capacity(end - start + floor);
        if let Some(system) = system {
            window.push(system.clone());
        }
        window.extend_from_slice(&history[start..end]);
        window
    }
}

fn leading_system(history: &[Message]) -> Option<&Message> {
    history.first().filter(|message| message.role == Role::System)
}

/// Exclusive end of the window: trailing system messages and an assistant
/// message whose tool calls were never answered are left out.
fn window_end(history: &[Message]) -> Option<usize> {
    let mut end = history.len();
    while end > 0 {
        let last = &history[end - 1];
        let valid = match last.role {
            Role::Human | Role::Tool => true,
            Role::Ai => !last.has_tool_calls(),
            Role::System => false,
        };
        if valid {
            return Some(end);
        }
        end -= 1;
    }
    None
}

/// Move `start` onto a human message: backward first, forward otherwise.
///
/// Returns `end`, an empty tail, when `floor..end` holds no human message.
fn align_start(history: &[Message], floor: usize, start: usize, end: usize) -> usize {
    if history[start].role == Role::Human {
        return start;
    }
    if let Some(back) = (floor..start).rev().find(|&i| history[i].role == Role::Human) {
        return back;
    }
    (start..end)
        .find(|&i| history[i].role == Role::Human)
        .unwrap_or(end)
}
