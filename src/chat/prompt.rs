const PERSONA: &str = "You are a versatile AI assistant that can provide both medical advice and \
help users with general concerns, emotions, and questions outside the medical field. Your \
responses should be empathetic, supportive, and insightful, regardless of the topic.";

const GUIDELINES: &str = "Guidelines for responding:
1. Provide a single, clear response directly addressing the user's current input.
2. Do not include any meta-information, instructions, or unrelated content in your response.
3. If the user mentions a medical concern, offer practical advice.
4. If the user talks about personal emotions, like feeling sad or hurt, respond with empathy and support.
5. Always keep your responses concise and relevant to the user's question or statement.";

/// Assemble the model prompt for one turn.
///
/// Retrieved passages appear in their own `Retrieved Information:` section after the user's
/// text, separated by blank lines. The section is omitted when nothing was retrieved.
pub fn build_prompt(history: &str, user_text: &str, context: &[String]) -> String {
    let mut input = format!("User Input: {user_text}");
    if !context.is_empty() {
        input.push_str("\n\nRetrieved Information: ");
        input.push_str(&context.join("\n\n"));
    }

    format!(
        "{PERSONA}\nPrevious conversation history:\n{history}\nCurrent user input:\n{input}\n\
         {GUIDELINES}\nYour response:\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_appear_in_order() {
        let prompt = build_prompt("Human: hi\nAI: hello", "I have a fever", &["Rest.".into()]);

        let history = prompt.find("Previous conversation history:").expect("history");
        let input = prompt.find("Current user input:").expect("input");
        let user = prompt.find("User Input: I have a fever").expect("user text");
        let context = prompt.find("Retrieved Information: Rest.").expect("context");
        assert!(history < input && input < user && user < context);
        assert!(prompt.contains("Human: hi\nAI: hello"));
        assert!(prompt.ends_with("Your response:\n"));
    }

    #[test]
    fn empty_context_omits_retrieved_section() {
        let prompt = build_prompt("", "hello", &[]);

        assert!(prompt.contains("User Input: hello\n"));
        assert!(!prompt.contains("Retrieved Information"));
    }

    #[test]
    fn passages_are_separated_by_blank_lines() {
        let prompt = build_prompt("", "q", &["first".into(), "second".into()]);
        assert!(prompt.contains("Retrieved Information: first\n\nsecond"));
    }
}
