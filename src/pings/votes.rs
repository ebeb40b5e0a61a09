use serde::{Deserialize, Serialize};

use crate::pings::domain::{CallerVote, UserId, Vote};

/// Derived vote state for one ping, as seen by one caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub vote_count: i64,
    pub current_user_vote: CallerVote,
}

/// Fold a ping's votes into a signed count and the caller's own vote.
///
/// Pure: the count does not depend on the order of `votes`, and without a
/// caller the caller vote is always `none`.
pub fn tally(votes: &[Vote], caller: Option<&UserId>) -> VoteTally {
    let vote_count = votes.iter().map(|v| v.vote_type.weight()).sum();
    let current_user_vote = caller
        .and_then(|id| votes.iter().find(|v| &v.voter_id == id))
        .map(|v| v.vote_type)
        .into();

    VoteTally {
        vote_count,
        current_user_vote,
    }
}
