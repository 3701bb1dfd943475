//! Prompt policy: the fixed system prompt, evidence formatting and the
//! two-message payload handed to the model-calling collaborator.
//!
//! Everything here is pure and infallible.

use energyqa_shared::{Chunk, Message};

macro_rules! off_topic_refusal {
    () => {
        "I can only answer questions about the energy physics topics covered in this project: \
         energy fundamentals, nuclear power, renewable energy, energy storage, and environmental impacts."
    };
}

macro_rules! general_knowledge_prefix {
    () => {
        "General knowledge (not from project materials):"
    };
}

/// Canned reply for out-of-scope questions.
pub const OFF_TOPIC_REFUSAL: &str = off_topic_refusal!();

/// Label the caller prepends when evidence confidence is low or none.
pub const GENERAL_KNOWLEDGE_PREFIX: &str = general_knowledge_prefix!();

/// Evidence text used when retrieval returned nothing.
pub const NO_EVIDENCE_PLACEHOLDER: &str = "No relevant evidence was found in the project materials.";

/// Separator between formatted evidence blocks.
pub const EVIDENCE_SEPARATOR: &str = "\n\n---\n\n";

/// Evidence bodies are cut to this many characters.
pub const MAX_EVIDENCE_CHARS: usize = 600;

pub const EVIDENCE_MARKER: &str = "[EVIDENCE FROM PROJECT MATERIALS]";
pub const QUESTION_MARKER: &str = "[STUDENT QUESTION]";

/// Behavioral contract for the answering model.
pub const SYSTEM_PROMPT: &str = concat!(
    "You are a study assistant for an energy physics project. ",
    "You answer questions about these topics only: energy fundamentals (conservation, work, power, efficiency), ",
    "nuclear power (fission, fusion, reactors, radioactive waste), renewable energy (solar, wind, hydro, geothermal, biomass), ",
    "energy storage (batteries, pumped hydro, hydrogen), and the environmental impacts of energy production.\n\n",
    "If a question is outside these topics, reply with exactly this sentence and nothing else:\n",
    off_topic_refusal!(),
    "\n\n",
    "Ground every answer in the evidence from the project materials supplied with the question. ",
    "Prefer the evidence over your own knowledge. Evidence blocks are labeled \"Evidence 1\", \"Evidence 2\" and so on; ",
    "cite a block by the bracketed reference numbers on its \"References:\" line, never by its evidence label.\n\n",
    "If the evidence is missing or does not answer the question, you may answer from general physics knowledge, ",
    "but begin that part of the answer with the label \"",
    general_knowledge_prefix!(),
    "\".\n\n",
    "End every answer with a line of the form \"Sources: [3], [4]\" listing the reference numbers you used, ",
    "or \"Sources: general knowledge\" when no evidence was used.\n\n",
    "Keep answers to 2-4 sentences for simple questions and at most 8 sentences for complex ones. ",
    "You may use inline math \\( ... \\) and display math \\[ ... \\] for equations."
);

/// Format retrieved chunks as numbered evidence blocks.
///
/// Each block carries a 1-based `Evidence n:` label, the quoted title with its section name,
/// the body cut to [`MAX_EVIDENCE_CHARS`] characters and, when the chunk has
/// resolved citations, a `References:` line.
pub fn format_evidence(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return NO_EVIDENCE_PLACEHOLDER.to_string();
    }

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format_block(i + 1, chunk))
        .collect::<Vec<_>>()
        .join(EVIDENCE_SEPARATOR)
}

fn format_block(position: usize, chunk: &Chunk) -> String {
    let body: String = chunk.text.chars().take(MAX_EVIDENCE_CHARS).collect();
    let mut block = format!(
        "Evidence {position}: \"{}\" ({})\n{body}",
        chunk.title, chunk.section_name
    );

    let ids = chunk.resolved_ref_ids();
    if !ids.is_empty() {
        let refs = ids
            .iter()
            .map(|id| format!("[{id}]"))
            .collect::<Vec<_>>()
            .join(", ");
        block.push_str("\nReferences: ");
        block.push_str(&refs);
    }
    block
}

/// Build the `[system, user]` payload for `query` over `chunks`.
pub fn build_messages(query: &str, chunks: &[Chunk]) -> Vec<Message> {
    let user = format!(
        "{EVIDENCE_MARKER}\n{}\n\n{QUESTION_MARKER}\n{query}",
        format_evidence(chunks)
    );
    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use energyqa_shared::{Reference, Role};

    use super::*;

    fn chunk(title: &str, text: &str, ref_ids: Vec<u32>, refs: Vec<u32>) -> Chunk {
        Chunk {
            id: format!("nuclear-{}", title.to_lowercase()),
            section: "nuclear".into(),
            section_name: "Nuclear Power".into(),
            title: title.into(),
            text: text.into(),
            ref_ids,
            refs: refs
                .into_iter()
                .map(|id| Reference {
                    id,
                    text: format!("Source {id}"),
                    url: None,
                })
                .collect(),
        }
    }

    #[test]
    fn empty_evidence_is_placeholder() {
        assert_eq!(format_evidence(&[]), NO_EVIDENCE_PLACEHOLDER);
    }

    #[test]
    fn evidence_blocks_are_numbered_and_separated() {
        let chunks = vec![
            chunk("Fission", "Fission splits nuclei.", vec![3, 4], vec![3, 4]),
            chunk("Waste", "Waste stays radioactive.", vec![], vec![]),
        ];
        let evidence = format_evidence(&chunks);
        let blocks: Vec<&str> = evidence.split(EVIDENCE_SEPARATOR).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0],
            "Evidence 1: \"Fission\" (Nuclear Power)\nFission splits nuclei.\nReferences: [3], [4]"
        );
        assert_eq!(blocks[1], "Evidence 2: \"Waste\" (Nuclear Power)\nWaste stays radioactive.");
    }

    #[test]
    fn references_line_lists_only_resolved_citations() {
        let evidence = format_evidence(&[chunk("Waste", "Body", vec![42, 3], vec![3])]);
        assert!(evidence.ends_with("References: [3]"));

        let evidence = format_evidence(&[chunk("Waste", "Body", vec![42], vec![])]);
        assert!(!evidence.contains("References:"));
    }

    #[test]
    fn long_bodies_truncate_to_limit() {
        let long = "é".repeat(MAX_EVIDENCE_CHARS + 50);
        let evidence = format_evidence(&[chunk("Long", &long, vec![], vec![])]);
        let body = evidence.lines().nth(1).unwrap();
        assert_eq!(body.chars().count(), MAX_EVIDENCE_CHARS);

        let exact = "x".repeat(MAX_EVIDENCE_CHARS);
        let evidence = format_evidence(&[chunk("Exact", &exact, vec![], vec![])]);
        assert_eq!(evidence.lines().nth(1).unwrap(), exact);
    }

    #[test]
    fn messages_are_system_then_user() {
        let query = "Why do control rods slow fission?";
        let messages = build_messages(query, &[chunk("Rods", "Rods absorb neutrons.", vec![], vec![])]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1].role, Role::User);

        let user = &messages[1].content;
        assert!(user.starts_with(EVIDENCE_MARKER));
        assert!(user.contains(QUESTION_MARKER));
        assert!(user.find(EVIDENCE_MARKER) < user.find(QUESTION_MARKER));
        assert!(user.contains("Rods absorb neutrons."));
        assert!(user.ends_with(query));
    }

    #[test]
    fn messages_without_evidence_use_placeholder() {
        let messages = build_messages("What is entropy?", &[]);
        assert!(messages[1].content.contains(NO_EVIDENCE_PLACEHOLDER));
        assert!(messages[1].content.ends_with("What is entropy?"));
    }

    #[test]
    fn evidence_labels_never_look_like_citations() {
        let evidence = format_evidence(&[chunk("Fission", "Body", vec![3], vec![3])]);
        assert!(evidence.starts_with("Evidence 1: "));
        assert!(!evidence.contains("[1]"));
        assert!(SYSTEM_PROMPT.contains("never by its evidence label"));
    }

    #[test]
    fn system_prompt_embeds_policy_strings() {
        assert!(SYSTEM_PROMPT.contains(OFF_TOPIC_REFUSAL));
        assert!(SYSTEM_PROMPT.contains(GENERAL_KNOWLEDGE_PREFIX));
        assert!(SYSTEM_PROMPT.contains("Sources: general knowledge"));
        assert!(OFF_TOPIC_REFUSAL.contains("energy fundamentals, nuclear power"));
    }
}
