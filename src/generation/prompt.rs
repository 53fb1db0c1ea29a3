use regex::Regex;
use std::sync::OnceLock;

/// Prompt with optional retrieved context, ending where the model should answer
pub fn build_prompt(user_input: &str, context: &str) -> String {
    if context.trim().is_empty() {
        format!("User: {}\nAI:", user_input)
    } else {
        format!("{}\nUser: {}\nAI:", context, user_input)
    }
}

fn turn_marker() -> &'static Regex {
    static TURN_MARKER: OnceLock<Regex> = OnceLock::new();
    TURN_MARKER.get_or_init(|| Regex::new(r"\n\s*(?:User|AI|Bot):").expect("Invalid turn marker regex"))
}

/// Clean a raw continuation into a single reply.
///
/// - drops an echoed copy of the prompt
/// - stops at the next `User:`/`AI:`/`Bot:` turn the model invents
/// - cuts a trailing unfinished sentence when an earlier sentence ended
///
/// Returns an empty string when nothing usable is left.
pub fn extract_response(generated: &str, prompt: &str) -> String {
    let continuation = generated.strip_prefix(prompt).unwrap_or(generated);
    // Leading newline so a marker at the very start is caught too
    let continuation = format!("\n{}", continuation.trim_start());

    let reply = match turn_marker().find(&continuation) {
        Some(m) if m.start() == 0 => "",
        Some(m) => &continuation[..m.start()],
        None => continuation.as_str(),
    };
    let mut reply = reply.trim();

    let ends_sentence = |c: char| matches!(c, '.' | '!' | '?');
    if let Some(last) = reply.chars().last() {
        if !ends_sentence(last) {
            if let Some(cut) = reply.rfind(ends_sentence) {
                reply = &reply[..cut + 1];
            }
        }
    }

    reply.trim().to_string()
}
