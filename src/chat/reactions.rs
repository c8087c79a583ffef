use super::Reaction;

/// One distinct emoji on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSummary {
    pub value: String,
    pub count: u32,
    pub reacted_by_me: bool,
}

/// Collapses reactions into distinct values, in first-seen order.
pub fn summarize(reactions: &[Reaction], local_participant_uuid: &str) -> Vec<ReactionSummary> {
    let mut out: Vec<ReactionSummary> = Vec::new();
    for reaction in reactions {
        let mine = reaction.participant_uuid == local_participant_uuid;
        match out.iter_mut().find(|s| s.value == reaction.value) {
            Some(summary) => {
                summary.count += reaction.count();
                summary.reacted_by_me |= mine;
            }
            None => out.push(ReactionSummary {
                value: reaction.value.clone(),
                count: reaction.count(),
                reacted_by_me: mine,
            }),
        }
    }
    out
}
