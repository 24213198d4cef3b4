mod classifier;
mod command_registry;
mod commands;
mod conversation;

pub use classifier::{
    classify_request, effective_prompt, Classification, GenerationMode, IntentClassifier,
    KeywordClassifier, EDIT_KEYWORDS, EDIT_PROMPT_PREFIX,
};
pub use command_registry::CHAT_HELP_COMMANDS;
pub use commands::{parse_chat_input, ChatInput};
pub use conversation::{Conversation, ConversationTurn, Role};
