//! Markdown rendering for context results

use super::{ContextBundle, SynthesizedContext};
use crate::models::Subject;

/// Characters shown per relevant excerpt
const EXCERPT_CHARS: usize = 200;

/// Advisory token count: characters / 4, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn header(subject: &Subject) -> String {
    let mut out = format!("# Context: {}\n", subject.name);
    if let Some(org) = &subject.organization_name {
        out.push_str(&format!("_Organization: {}_\n", org));
    }
    out
}

fn bullet_section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {}\n", title));
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
}

/// Context for a bot subject
pub fn render_minimal(subject: &Subject) -> String {
    format!(
        "{}\nAutomated account. No relationship context is kept for bots.\n",
        header(subject)
    )
}

/// Render a synthesized narrative
pub fn render_synthesized(subject: &Subject, context: &SynthesizedContext) -> String {
    let mut out = header(subject);
    out.push_str(&format!("\n## Current status\n{}\n", context.current_status));
    bullet_section(&mut out, "Recent context", &context.recent_context);
    bullet_section(&mut out, "Key facts", &context.key_facts);
    bullet_section(&mut out, "Recommendations", &context.recommendations);
    out
}

/// Render the tiers directly, without synthesis.
///
/// Pure function of the bundle: the same bundle always renders identically.
pub fn render_degraded(bundle: &ContextBundle) -> String {
    let mut out = header(&bundle.subject);

    if let Some(hint) = &bundle.task_hint {
        out.push_str(&format!("\n_Task: {}_\n", hint));
    }

    if !bundle.permanent.is_empty() {
        out.push_str("\n## Facts\n");
        for fact in &bundle.permanent {
            out.push_str(&format!("- **{}**: {}\n", fact.fact_type, fact.display_value()));
        }
    }

    if let Some(profile) = &bundle.cold {
        out.push_str("\n## Relationship\n");
        out.push_str(&format!(
            "{} ({}, {})\n",
            profile.relationship_summary,
            profile.relationship_type,
            profile.communication_frequency
        ));
        bullet_section(&mut out, "Milestones", &profile.milestones);
        bullet_section(&mut out, "Key decisions", &profile.key_decisions);
    }

    if !bundle.warm.is_empty() {
        out.push_str("\n## Earlier interactions\n");
        for summary in &bundle.warm {
            out.push_str(&format!(
                "- {}: {}\n",
                summary.created_at.format("%Y-%m-%d"),
                summary.summary
            ));
            for decision in &summary.decisions {
                out.push_str(&format!("  - Decision: {}\n", decision.description));
            }
        }
    }

    if !bundle.hot.is_empty() {
        out.push_str("\n## Recent activity\n");
        out.push_str(&format!(
            "{} message(s) and {} call segment(s) in the last {} days",
            bundle.hot.messages.len(),
            bundle.hot.segments.len(),
            bundle.hot_tier_days
        ));
        let latest = bundle
            .hot
            .messages
            .iter()
            .map(|m| m.timestamp)
            .chain(bundle.hot.segments.iter().map(|s| s.timestamp))
            .max();
        if let Some(latest) = latest {
            out.push_str(&format!(", latest on {}", latest.format("%Y-%m-%d")));
        }
        out.push_str(".\n");
    }

    if !bundle.relevant.is_empty() {
        out.push_str("\n## Relevant excerpts\n");
        for hit in &bundle.relevant {
            out.push_str(&format!(
                "- {}: {}\n",
                hit.timestamp.format("%Y-%m-%d"),
                hit.preview(EXCERPT_CHARS)
            ));
        }
    }

    if bundle.is_empty() {
        out.push_str("\nNo context recorded yet.\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fact, RelationshipProfile};
    use chrono::Utc;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("ééééé"), 2);
    }

    #[test]
    fn test_render_synthesized() {
        let subject = Subject::new("Ana");
        let context = SynthesizedContext {
            current_status: "Negotiating the renewal".to_string(),
            recent_context: vec!["Asked for a discount".to_string()],
            key_facts: Vec::new(),
            recommendations: vec!["Offer annual billing".to_string()],
        };

        let md = render_synthesized(&subject, &context);
        assert!(md.starts_with("# Context: Ana\n"));
        assert!(md.contains("## Current status\nNegotiating the renewal"));
        assert!(md.contains("- Offer annual billing"));
        assert!(!md.contains("## Key facts"));
    }

    #[test]
    fn test_render_degraded_is_deterministic() {
        let subject = Subject::new("Ana");
        let now = Utc::now();
        let mut bundle = ContextBundle::minimal(subject.clone(), None, now);
        bundle.permanent.push(Fact {
            id: 1,
            subject_id: subject.id,
            fact_type: "city".to_string(),
            value: Some("Lisbon".to_string()),
            value_date: None,
            valid_from: None,
            valid_until: None,
            confidence: None,
            created_at: now,
        });
        bundle.cold = Some(RelationshipProfile {
            subject_id: subject.id,
            relationship_type: "client".to_string(),
            communication_frequency: "monthly".to_string(),
            relationship_summary: "Steady account".to_string(),
            milestones: vec!["Signed in 2023".to_string()],
            key_decisions: Vec::new(),
            updated_at: now,
        });

        let first = render_degraded(&bundle);
        let second = render_degraded(&bundle);
        assert_eq!(first, second);
        assert!(first.contains("- **city**: Lisbon"));
        assert!(first.contains("Steady account (client, monthly)"));
        assert!(first.contains("- Signed in 2023"));
        assert!(!first.contains("No context recorded"));
    }

    #[test]
    fn test_render_empty_and_minimal() {
        let subject = Subject::new("Ana");
        let bundle = ContextBundle::minimal(subject.clone(), None, Utc::now());
        assert!(render_degraded(&bundle).contains("No context recorded yet."));

        let bot = Subject::bot("Build Bot");
        assert!(render_minimal(&bot).contains("Automated account"));
    }
}
