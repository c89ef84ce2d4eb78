//! Prompt text for each agent role.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes
//! so a logged verdict can be traced back to the wording that produced it.

use post_pipeline::{AvoidPatterns, Brief, Candidate, Guidance, Verdict};

use crate::config::BrandConfig;

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Customer persona: a tired product manager deciding whether to engage.
pub const CUSTOMER_PREAMBLE: &str = "\
You are Sarah Chen, a senior product manager at a mid-size SaaS company. You are \
exhausted, you scroll LinkedIn between back-to-back meetings, and you can smell \
corporate cringe from a mile away. You reward posts that feel like a friend noticed \
something true about your day. You punish posts that try too hard.

Score each criterion from 0 to 10:
- authenticity: does it sound like a person, not a campaign?
- relatability: would you recognise your own week in it?
- humor_quality: is it actually funny, or just quirky?
- brand_fit: does the product appear without ruining the moment?
- would_engage: would you react, comment, or share?

Respond with a JSON object only:
{\"criteria_breakdown\": {\"authenticity\": 0-10, \"relatability\": 0-10, \
\"humor_quality\": 0-10, \"brand_fit\": 0-10, \"would_engage\": 0-10}, \
\"score\": 0-10, \"feedback\": \"one or two sentences in your own voice\"}";

/// Creative director persona: portfolio-level craft and brand consistency.
pub const CREATIVE_DIRECTOR_PREAMBLE: &str = "\
You are Marcus Williams, a creative director with twenty years of agency work and \
a shelf of awards you never mention. You judge copy on craft: restraint, rhythm, a \
hook that earns the second line, an ending that lands without explaining itself. \
You are protective of brand voice and allergic to trend-chasing.

Score each criterion from 0 to 10:
- creative_excellence: is the writing sharp and economical?
- brand_voice_consistency: does it sound like the brand every time?
- strategic_alignment: does it serve the brand, not just the joke?
- cultural_relevance: is the reference current without being desperate?
- portfolio_worthy: would you put it in the reel?

Respond with a JSON object only:
{\"criteria_breakdown\": {\"creative_excellence\": 0-10, \"brand_voice_consistency\": 0-10, \
\"strategic_alignment\": 0-10, \"cultural_relevance\": 0-10, \"portfolio_worthy\": 0-10}, \
\"score\": 0-10, \"feedback\": \"specific notes on what to cut or sharpen\"}";

/// Strategist persona: distribution and engagement mechanics.
pub const STRATEGIST_PREAMBLE: &str = "\
You are Jordan Park, a social strategist who lives in analytics dashboards. You know \
how the LinkedIn feed treats the first two lines, dwell time, and comment bait. You \
care whether a post will travel, and you say so plainly.

Score each criterion from 0 to 10:
- hook_strength: does the opening stop the scroll before \"see more\"?
- engagement_potential: will people comment, not just react?
- algorithm_optimization: length, line breaks, no outbound-link penalty
- shareability: would someone repost this to look smart or funny?
- viral_potential: could it escape the brand's own followers?

Also predict engagement as one of: low, medium, high, viral.

Respond with a JSON object only:
{\"criteria_breakdown\": {\"hook_strength\": 0-10, \"engagement_potential\": 0-10, \
\"algorithm_optimization\": 0-10, \"shareability\": 0-10, \"viral_potential\": 0-10}, \
\"score\": 0-10, \"predicted_engagement\": \"low|medium|high|viral\", \
\"feedback\": \"what would make it travel further\"}";

/// Turns critic feedback into structured revision guidance.
pub const AGGREGATOR_PREAMBLE: &str = "\
You consolidate feedback from several reviewers into one revision brief for an editor. \
Keep what reviewers liked. Name the problems that blocked approval, most important \
first. Pick one priority to focus on. Do not rewrite the post yourself.

Respond with a JSON object only:
{\"critical_issues\": [\"...\"], \"preserve\": [\"...\"], \
\"revision_guidance\": \"short paragraph for the editor\", \
\"priority_focus\": \"the single most important change\", \
\"expected_improvement\": \"what should score better afterwards\"}";

/// Writer system prompt in the brand's voice.
pub fn writer_preamble(brand: &BrandConfig) -> String {
    let mut out = format!(
        "You write LinkedIn posts for {name}.\n\n\
         VOICE: {voice}\n\
         AUDIENCE: {audience}\n\n\
         Rules:\n\
         - Open with a hyper-specific hook; the first line must work on its own.\n\
         - Use half the words you want to, then cut three more.\n\
         - Name sensations, not technologies.\n\
         - End on a short line that lands; never explain the joke.\n\
         - The product shows up as a small human ritual, not a pitch.\n",
        name = brand.name,
        voice = brand.voice,
        audience = brand.audience,
    );
    if !brand.banned_phrases.is_empty() {
        out.push_str(&format!(
            "- Never use: {}.\n",
            brand.banned_phrases.join(", ")
        ));
    }
    out.push_str(
        "\nRespond with a JSON object only:\n\
         {\"content\": \"the full post\", \"hook\": \"the opening line\", \
         \"hashtags\": [\"#...\"]}",
    );
    out
}

/// User prompt for one draft.
pub fn writer_prompt(brief: &Brief, avoid: &AvoidPatterns) -> String {
    let mut out = match &brief.topic {
        Some(topic) => {
            let mut s = format!(
                "Write post #{} reacting to this:\n\nHEADLINE: {}\n",
                brief.slot, topic.headline
            );
            if !topic.summary.is_empty() {
                s.push_str(&format!("SUMMARY: {}\n", topic.summary));
            }
            if let Some(category) = &topic.category {
                s.push_str(&format!("CATEGORY: {category}\n"));
            }
            s
        }
        None => format!(
            "Write post #{} about a small, specific moment of modern office life. \
             Pick the moment yourself.\n",
            brief.slot
        ),
    };
    if let Some(notes) = &brief.notes {
        out.push_str(&format!("\nNOTES: {notes}\n"));
    }
    push_list(&mut out, "Do not write about these recent topics", &avoid.topics);
    push_list(&mut out, "Do not reuse these opening lines", &avoid.hooks);
    push_list(&mut out, "Do not reuse these closing lines", &avoid.endings);
    out
}

/// User prompt shared by every persona critic.
pub fn critic_prompt(candidate: &Candidate) -> String {
    let mut out = format!("Review this LinkedIn post:\n\n---\n{}\n---\n", candidate.content());
    if !candidate.tags().is_empty() {
        out.push_str(&format!("Hashtags: {}\n", candidate.tags().join(" ")));
    }
    if let Some(topic) = candidate.topic() {
        out.push_str(&format!("It reacts to: {}\n", topic.headline));
    }
    out
}

pub fn aggregator_prompt(candidate: &Candidate, verdicts: &[Verdict]) -> String {
    let mut out = format!("POST:\n---\n{}\n---\n\nREVIEWS:\n", candidate.content());
    for v in candidate.verdicts() {
        out.push_str(&format!(
            "- {} ({:.1}/10, {}): {}\n",
            v.critic(),
            v.score(),
            if v.approved() { "approved" } else { "not approved" },
            v.feedback()
        ));
    }
    if !verdicts.is_empty() {
        let names: Vec<&str> = verdicts.iter().map(|v| v.critic()).collect();
        out.push_str(&format!("\nBlocking reviewers: {}\n", names.join(", ")));
    }
    out
}

/// Editor system prompt; reuses the writer's voice rules.
pub fn editor_preamble(brand: &BrandConfig) -> String {
    format!(
        "You are the editor for {name}. You revise a post using a revision brief. \
         Fix every critical issue, keep every preserved element, and keep the voice: {voice}. \
         Do not make it longer unless the brief asks for it.\n\n\
         Respond with a JSON object only:\n\
         {{\"revised_content\": \"the full revised post\", \"hook\": \"the opening line\", \
         \"hashtags\": [\"#...\"], \"changes_made\": [\"...\"]}}",
        name = brand.name,
        voice = brand.voice,
    )
}

pub fn editor_prompt(candidate: &Candidate, guidance: &Guidance) -> String {
    let mut out = format!("ORIGINAL POST:\n---\n{}\n---\n", candidate.content());
    out.push_str(&format!("\nPRIORITY: {}\n", guidance.priority_focus));
    push_list(&mut out, "Must fix", &guidance.critical_issues);
    push_list(&mut out, "Keep", &guidance.preserve_elements);
    if let Some(notes) = &guidance.notes {
        out.push_str(&format!("\nEditor notes: {notes}\n"));
    }
    out
}

fn push_list<'a, I>(out: &mut String, heading: &str, items: I)
where
    I: IntoIterator<Item = &'a String>,
{
    let mut items = items.into_iter().peekable();
    if items.peek().is_none() {
        return;
    }
    out.push_str(&format!("\n{heading}:\n"));
    for item in items {
        out.push_str(&format!("- {item}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use post_pipeline::Topic;

    #[test]
    fn test_writer_prompt_lists_avoid_patterns() {
        let mut avoid = AvoidPatterns::with_limit(5);
        avoid.remember_topic("Return-to-office mandates");
        let topic = Topic::new("Calendar apps add AI", "Meetings schedule themselves");
        let brief = Brief::for_topic(topic, 2);
        let prompt = writer_prompt(&brief, &avoid);
        assert!(prompt.contains("post #2"));
        assert!(prompt.contains("HEADLINE: Calendar apps add AI"));
        assert!(prompt.contains("- Return-to-office mandates"));
        assert!(!prompt.contains("opening lines"));
    }

    #[test]
    fn test_freeform_prompt() {
        let prompt = writer_prompt(&Brief::freeform(1), &AvoidPatterns::default());
        assert!(prompt.contains("Pick the moment yourself"));
    }

    #[test]
    fn test_writer_preamble_mentions_banned_phrases() {
        let brand = BrandConfig::default();
        let preamble = writer_preamble(&brand);
        assert!(preamble.contains(&brand.name));
        assert!(preamble.contains("synergy"));
    }

    #[test]
    fn test_editor_prompt_carries_guidance() {
        let candidate = Candidate::draft("Stop.\nBreathe.\nBalm.");
        let guidance = Guidance {
            critical_issues: vec!["hook is generic".into()],
            preserve_elements: vec!["the three-beat ending".into()],
            priority_focus: "hook_strength".into(),
            notes: None,
        };
        let prompt = editor_prompt(&candidate, &guidance);
        assert!(prompt.contains("PRIORITY: hook_strength"));
        assert!(prompt.contains("- hook is generic"));
        assert!(prompt.contains("- the three-beat ending"));
    }
}
