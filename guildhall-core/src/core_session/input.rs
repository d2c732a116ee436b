//! Free-text capture that temporarily replaces the screen

use super::context::ScreenContext;
use super::screen::Screen;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputVerdict {
    Accept,
    Reject(String),
}

/// What happens after a rejected value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectPolicy {
    /// Stay in input mode and ask again
    #[default]
    KeepCapturing,
    /// Leave input mode and reopen the originating screen
    ReturnToOrigin,
}

/// How `dispatch_input` handled a line of text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDispatch {
    /// Session was not capturing; the text is ordinary chat
    NotCapturing,
    Accepted,
    Rejected,
    Cancelled,
}

impl InputDispatch {
    /// Whether the text was consumed by the session
    pub fn consumed(&self) -> bool {
        !matches!(self, InputDispatch::NotCapturing)
    }
}

pub(crate) type Validator = Box<dyn FnMut(&str, &mut ScreenContext<'_>) -> InputVerdict + Send>;
pub type ScreenFactory = Box<dyn Fn() -> Box<dyn Screen> + Send>;

/// A pending request for one line of text
pub struct InputPrompt {
    pub prompt: String,
    pub on_reject: RejectPolicy,
    pub(crate) validator: Validator,
    pub(crate) origin: Option<ScreenFactory>,
}

impl InputPrompt {
    /// `validator` runs on the loop with the line exactly as typed, so it
    /// owns any trimming. On accept it is responsible for acting on the
    /// value, usually through `ScreenContext::spawn`
    pub fn new<F>(prompt: impl Into<String>, validator: F) -> Self
    where
        F: FnMut(&str, &mut ScreenContext<'_>) -> InputVerdict + Send + 'static,
    {
        Self {
            prompt: prompt.into(),
            on_reject: RejectPolicy::default(),
            validator: Box::new(validator),
            origin: None,
        }
    }

    /// Screen to reopen on cancel, and on reject under `ReturnToOrigin`
    pub fn origin<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Screen> + Send + 'static,
    {
        self.origin = Some(Box::new(factory));
        self
    }

    pub fn on_reject(mut self, policy: RejectPolicy) -> Self {
        self.on_reject = policy;
        self
    }

    pub(crate) fn reopen_origin(&self) -> Option<Box<dyn Screen>> {
        self.origin.as_ref().map(|factory| factory())
    }
}

impl fmt::Debug for InputPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPrompt")
            .field("prompt", &self.prompt)
            .field("on_reject", &self.on_reject)
            .field("has_origin", &self.origin.is_some())
            .finish()
    }
}

/// True when `text` is the cancel keyword, ignoring case and padding
pub fn is_cancel(text: &str, keyword: &str) -> bool {
    text.trim().eq_ignore_ascii_case(keyword.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_keyword() {
        assert!(is_cancel("cancel", "cancel"));
        assert!(is_cancel("  CANCEL ", "cancel"));
        assert!(!is_cancel("cancel it", "cancel"));
    }

    #[test]
    fn test_prompt_builder() {
        let prompt = InputPrompt::new("Enter a tag", |_, _| InputVerdict::Accept)
            .on_reject(RejectPolicy::ReturnToOrigin);
        assert_eq!(prompt.on_reject, RejectPolicy::ReturnToOrigin);
        assert!(prompt.reopen_origin().is_none());
        assert!(InputDispatch::Rejected.consumed());
        assert!(!InputDispatch::NotCapturing.consumed());
    }
}
