use super::command_registry::{CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS};

/// A line typed into the interactive chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Noop,
    Help,
    History,
    Quit,
    /// `/model` with no argument reports the current selector.
    SetModel(Option<String>),
    Unknown { command: String, arg: String },
    Prompt(String),
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

pub fn parse_chat_input(text: &str) -> ChatInput {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ChatInput::Noop;
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if find_action(&command, RAW_ARG_COMMANDS).is_some() {
                let selector = Some(arg.to_string()).filter(|value| !value.is_empty());
                return ChatInput::SetModel(selector);
            }

            return match find_action(&command, NO_ARG_COMMANDS) {
                Some("help") => ChatInput::Help,
                Some("history") => ChatInput::History,
                Some("quit") => ChatInput::Quit,
                _ => ChatInput::Unknown {
                    command,
                    arg: arg.to_string(),
                },
            };
        }
    }

    ChatInput::Prompt(raw_trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_chat_input, ChatInput};

    #[test]
    fn blank_lines_are_noops() {
        assert_eq!(parse_chat_input(""), ChatInput::Noop);
        assert_eq!(parse_chat_input("   \t"), ChatInput::Noop);
    }

    #[test]
    fn plain_text_is_a_prompt() {
        assert_eq!(
            parse_chat_input("  Create a futuristic city at sunset \n"),
            ChatInput::Prompt("Create a futuristic city at sunset".to_string())
        );
    }

    #[test]
    fn parse_model_command() {
        assert_eq!(
            parse_chat_input("/model 2.5"),
            ChatInput::SetModel(Some("2.5".to_string()))
        );
        assert_eq!(parse_chat_input("/MODEL"), ChatInput::SetModel(None));
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_chat_input("/help"), ChatInput::Help);
        assert_eq!(parse_chat_input("/history"), ChatInput::History);
        assert_eq!(parse_chat_input("/quit"), ChatInput::Quit);
        assert_eq!(parse_chat_input("/exit"), ChatInput::Quit);
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(
            parse_chat_input("/magic foo bar"),
            ChatInput::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string(),
            }
        );
    }

    #[test]
    fn lone_slash_is_a_prompt() {
        assert_eq!(parse_chat_input("/ "), ChatInput::Prompt("/".to_string()));
    }
}
