use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use studio_contracts::chat::{Conversation, GenerationMode};
use studio_contracts::generation::{GenerationRequest, GenerationResult};

use crate::GenerationEngine;

/// One chat: its history, the chosen model selector and a busy flag that a
/// UI thread can watch while a submission is running.
#[derive(Debug, Default)]
pub struct ChatSession {
    conversation: Conversation,
    model: Option<String>,
    in_progress: Arc<AtomicBool>,
}

impl ChatSession {
    pub fn new(model: Option<String>) -> Self {
        Self {
            model: model.filter(|value| !value.trim().is_empty()),
            ..Self::default()
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: Option<String>) {
        self.model = model.filter(|value| !value.trim().is_empty());
    }

    pub fn progress_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.in_progress)
    }

    pub fn is_generating(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Sends `input` through `engine` and records both turns. Blank input is
    /// ignored and returns `None`.
    pub fn submit(&mut self, engine: &GenerationEngine, input: &str) -> Option<GenerationResult> {
        if input.trim().is_empty() {
            return None;
        }

        let history = self.conversation.turns().to_vec();
        self.conversation.push_user(input);

        let result = {
            let _busy = ProgressGuard::raise(&self.in_progress);
            match GenerationRequest::new(Some(input.to_string()), self.model.clone(), history) {
                Ok(request) => engine.submit(&request),
                Err(error) => GenerationResult::failure(error, GenerationMode::Generate),
            }
        };

        self.conversation
            .push_assistant(result.turn_text(), result.image.clone());
        Some(result)
    }
}

struct ProgressGuard<'a>(&'a AtomicBool);

impl<'a> ProgressGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use studio_contracts::chat::Role;

    use super::*;
    use crate::testing::{empty_reply, engine, image_reply, Call, Reply, ScriptedBackend};

    #[test]
    fn blank_input_is_ignored() {
        let backend = ScriptedBackend::new(Vec::new());
        let engine = engine(backend.clone());
        let mut session = ChatSession::new(None);

        assert_eq!(session.submit(&engine, "   "), None);
        assert!(session.conversation().is_empty());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn success_appends_user_and_assistant_turns() {
        let backend = ScriptedBackend::new(vec![image_reply("QUJD")]);
        let engine = engine(backend);
        let mut session = ChatSession::new(Some("3.0".to_string()));

        let result = session.submit(&engine, "a lighthouse").expect("result");
        assert!(result.is_success());
        assert!(!session.is_generating());

        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "a lighthouse");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].content, "Image generated successfully!");
        assert_eq!(
            turns[1].image.as_deref(),
            Some("data:image/png;base64,QUJD")
        );
    }

    #[test]
    fn follow_up_edit_sees_prior_image_but_not_itself() {
        let backend = ScriptedBackend::new(vec![image_reply("QUJD"), image_reply("REVG")]);
        let engine = engine(backend.clone());
        let mut session = ChatSession::new(None);

        session.submit(&engine, "a lighthouse");
        let second = session.submit(&engine, "make it stormy").expect("result");

        assert_eq!(second.mode, GenerationMode::Edit);
        assert_eq!(second.status, "Image modified successfully!");
        assert_eq!(
            backend.calls()[1],
            Call::Image {
                model: "imagen-3.0-generate-001".to_string(),
                prompt: "Based on the previous image generation, now: make it stormy".to_string(),
            }
        );
        assert_eq!(session.conversation().len(), 4);
        assert_eq!(
            session.conversation().last_image(),
            Some("data:image/png;base64,REVG")
        );
    }

    #[test]
    fn first_turn_edit_wording_still_generates() {
        let backend = ScriptedBackend::new(vec![image_reply("QUJD")]);
        let engine = engine(backend);
        let mut session = ChatSession::new(None);

        let result = session.submit(&engine, "add a dragon").expect("result");
        assert_eq!(result.mode, GenerationMode::Generate);
        assert_eq!(result.status, "Image generated successfully!");
    }

    #[test]
    fn failure_is_recorded_as_error_turn() {
        let backend = ScriptedBackend::new(vec![
            empty_reply(),
            Reply::Text("better".to_string()),
            empty_reply(),
        ]);
        let engine = engine(backend);
        let mut session = ChatSession::new(None);

        let result = session.submit(&engine, "a city").expect("result");
        assert!(!result.is_success());
        assert!(!session.is_generating());

        let last = &session.conversation().turns()[1];
        assert_eq!(
            last.content,
            "Error: Failed to generate image. Please try a different prompt."
        );
        assert_eq!(last.image, None);
    }

    #[test]
    fn progress_flag_is_raised_while_running() {
        let flag = AtomicBool::new(false);
        {
            let _guard = ProgressGuard::raise(&flag);
            assert!(flag.load(Ordering::SeqCst));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn blank_model_selector_is_cleared() {
        let mut session = ChatSession::new(Some("2.5".to_string()));
        assert_eq!(session.model(), Some("2.5"));
        session.set_model(Some("  ".to_string()));
        assert_eq!(session.model(), None);
    }
}
