//! Prompt assembly for stat inference.
//!
//! The prompt embeds the previous message, its known stats serialized
//! as `<stats character="X" key="value" .../>` lines, the current
//! message, and a partial stats tag cut right after `target="` so the
//! completion is the bare value up to a closing quote.

use super::context::MessageContext;
use crate::chat::{MessageStats, StatValues, SCENE_KEY};
use crate::registry::{StatRegistry, StatScope};

/// Whose stat tag the completion is asked to finish.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Character(&'a str),
    Scene,
}

/// Render the inference prompt for one (subject, stat) pair.
///
/// `working` holds the values resolved so far in this pass; stats
/// earlier in declared order appear in the partial tag, so freshly
/// generated dependencies feed into later stats.
pub fn render(
    ctx: &MessageContext,
    registry: &StatRegistry,
    subject: Subject<'_>,
    working: &MessageStats,
    target: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/stat_infer.txt"));
    prompt.push('\n');

    if let (Some(name), Some(text)) = (&ctx.previous_name, &ctx.previous_text) {
        prompt.push_str(&format!("Previous message ({name}):\n{text}\n\n"));
        for (character, values) in &ctx.previous_stats.characters {
            if let Some(values) = values {
                prompt.push_str(&stats_line(
                    registry,
                    StatScope::Character,
                    "character",
                    character,
                    values,
                ));
                prompt.push('\n');
            }
        }
        if let Some(Some(values)) = ctx.previous_stats.scenes.get(SCENE_KEY) {
            prompt.push_str(&stats_line(
                registry,
                StatScope::Scene,
                "scene",
                SCENE_KEY,
                values,
            ));
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "Current message ({}):\n{}\n\n",
        ctx.current_name, ctx.current_text
    ));

    prompt.push_str(&partial_line(registry, subject, working, target));
    prompt
}

/// A complete `<stats ... />` line for one subject.
fn stats_line(
    registry: &StatRegistry,
    scope: StatScope,
    subject_attr: &str,
    subject: &str,
    values: &StatValues,
) -> String {
    let mut line = format!("<stats {subject_attr}=\"{}\"", xml_escape(subject));
    for def in registry.active_stats(Some(scope)) {
        if let Some(value) = values.get(&def.name) {
            line.push_str(&format!(" {}=\"{}\"", def.name, xml_escape(value)));
        }
    }
    line.push_str(" />");
    line
}

/// The unfinished tag the completion continues: every stat preceding
/// `target` in declared order with its working value, then `target="`.
fn partial_line(
    registry: &StatRegistry,
    subject: Subject<'_>,
    working: &MessageStats,
    target: &str,
) -> String {
    let (scope, subject_attr, subject_name) = match subject {
        Subject::Character(name) => (StatScope::Character, "character", name),
        Subject::Scene => (StatScope::Scene, "scene", SCENE_KEY),
    };

    let mut line = format!("<stats {subject_attr}=\"{}\"", xml_escape(subject_name));
    for def in registry.active_stats(Some(scope)) {
        if def.name == target {
            break;
        }
        let value = match subject {
            Subject::Character(name) => working.character_value(name, &def.name),
            Subject::Scene => working.scene_value(&def.name),
        };
        if let Some(value) = value {
            line.push_str(&format!(" {}=\"{}\"", def.name, xml_escape(value)));
        }
    }
    line.push_str(&format!(" {target}=\""));
    line
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatLog, ChatMessage, MessageStore};
    use crate::registry::StatDefinition;

    fn registry() -> StatRegistry {
        let mut registry = StatRegistry::new();
        registry.add_stat(StatDefinition::new("pose", StatScope::Character).with_order(0));
        registry.add_stat(
            StatDefinition::new("location", StatScope::Character)
                .with_order(1)
                .with_dependencies(vec!["pose".to_string()]),
        );
        registry.add_stat(StatDefinition::new("time", StatScope::Scene).with_order(0));
        registry
    }

    fn context() -> MessageContext {
        let mut log = ChatLog::new();
        let first = log.push(ChatMessage::new("Alice", "She sits by the fire."));
        log.push(ChatMessage::new("Alice", "She rises and walks out."));

        let mut stats = MessageStats::new();
        stats.set_character_value("Alice", "pose", "sitting");
        stats.set_character_value("Alice", "location", "by the fire");
        stats.set_scene_value("time", "evening");
        log.set_stats(first, stats);

        MessageContext::build(&log, &registry(), 1, &["Alice".to_string()]).unwrap()
    }

    #[test]
    fn test_prompt_ends_at_target_value() {
        let ctx = context();
        let mut working = MessageStats::new();
        working.set_character_value("Alice", "pose", "standing");

        let prompt = render(
            &ctx,
            &registry(),
            Subject::Character("Alice"),
            &working,
            "location",
        );

        assert!(prompt.ends_with("<stats character=\"Alice\" pose=\"standing\" location=\""));
    }

    #[test]
    fn test_prompt_embeds_previous_stats() {
        let ctx = context();
        let prompt = render(
            &ctx,
            &registry(),
            Subject::Character("Alice"),
            &MessageStats::new(),
            "pose",
        );

        assert!(prompt.contains("Previous message (Alice):"));
        assert!(prompt.contains("She sits by the fire."));
        assert!(prompt
            .contains("<stats character=\"Alice\" pose=\"sitting\" location=\"by the fire\" />"));
        assert!(prompt.contains("<stats scene=\"scene\" time=\"evening\" />"));
        assert!(prompt.contains("Current message (Alice):"));
    }

    #[test]
    fn test_first_stat_has_no_preceding_attributes() {
        let ctx = context();
        let prompt = render(
            &ctx,
            &registry(),
            Subject::Character("Alice"),
            &MessageStats::new(),
            "pose",
        );
        assert!(prompt.ends_with("<stats character=\"Alice\" pose=\""));
    }

    #[test]
    fn test_scene_subject() {
        let ctx = context();
        let prompt = render(&ctx, &registry(), Subject::Scene, &MessageStats::new(), "time");
        assert!(prompt.ends_with("<stats scene=\"scene\" time=\""));
    }

    #[test]
    fn test_values_are_attribute_escaped() {
        let ctx = context();
        let mut working = MessageStats::new();
        working.set_character_value("Alice", "pose", "aiming a \"borrowed\" crossbow");

        let prompt = render(
            &ctx,
            &registry(),
            Subject::Character("Alice"),
            &working,
            "location",
        );
        assert!(prompt.contains("pose=\"aiming a &quot;borrowed&quot; crossbow\""));
    }
}
