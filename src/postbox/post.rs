//! Decoded view of a post account.

use crate::codec::{MessagePayload, PayloadCodec};
use crate::program::accounts::{PostAccount, PostRestriction, VoteDirection};
use crate::pubkey::Pubkey;
use std::cmp::Ordering;

/// Where a post hangs in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostParent {
    /// Top-level post under the postbox.
    Postbox(Pubkey),
    /// Reply under another post.
    Post(Pubkey),
}

impl PostParent {
    /// Address used as the derivation parent.
    pub fn address(&self) -> &Pubkey {
        match self {
            PostParent::Postbox(key) | PostParent::Post(key) => key,
        }
    }
}

/// A live post.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    /// Account address.
    pub address: Pubkey,
    /// Parent this post was allocated under.
    pub parent: PostParent,
    /// Slot id under the parent.
    pub id: u32,
    /// Author.
    pub poster: Pubkey,
    /// Decoded content.
    pub payload: MessagePayload,
    /// Next unused reply slot.
    pub max_reply_id: u32,
    /// Up-vote tally.
    pub up_votes: u32,
    /// Down-vote tally.
    pub down_votes: u32,
    /// Restriction on replies set by this post, if any.
    pub restriction: Option<PostRestriction>,
}

impl Post {
    pub(crate) fn from_account(
        address: Pubkey,
        parent: PostParent,
        id: u32,
        account: PostAccount,
    ) -> Self {
        Self {
            payload: PayloadCodec::decode_lenient(&account.data, parent.address()),
            address,
            parent,
            id,
            poster: account.poster,
            max_reply_id: account.max_reply_id,
            up_votes: account.up_votes,
            down_votes: account.down_votes,
            restriction: account.restriction,
        }
    }

    /// True when the payload is flagged as a topic.
    pub fn is_topic(&self) -> bool {
        self.payload.is_topic()
    }

    /// True for replies.
    pub fn is_reply(&self) -> bool {
        matches!(self.parent, PostParent::Post(_))
    }

    /// Up-votes minus down-votes.
    pub fn score(&self) -> i64 {
        i64::from(self.up_votes) - i64::from(self.down_votes)
    }

    /// Tally for one direction.
    pub fn votes(&self, direction: VoteDirection) -> u32 {
        match direction {
            VoteDirection::Up => self.up_votes,
            VoteDirection::Down => self.down_votes,
        }
    }

    /// Oldest first: timestamp, then slot id.
    pub fn chronological(a: &Post, b: &Post) -> Ordering {
        a.payload
            .ts
            .cmp(&b.payload.ts)
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Newest first.
    pub fn newest_first(a: &Post, b: &Post) -> Ordering {
        Self::chronological(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PayloadCodec;

    fn post(id: u32, ts: u64) -> Post {
        let payload = MessagePayload::new(format!("post {}", id)).with_ts(ts);
        let account = PostAccount {
            poster: Pubkey::new_unique(),
            data: PayloadCodec::encode(&payload).unwrap(),
            max_reply_id: 0,
            up_votes: 3,
            down_votes: 5,
            reply_to: None,
            restriction: None,
        };
        Post::from_account(
            Pubkey::new_unique(),
            PostParent::Postbox(Pubkey::new_unique()),
            id,
            account,
        )
    }

    #[test]
    fn test_ordering() {
        let mut posts = vec![post(2, 100), post(0, 300), post(1, 100)];
        posts.sort_by(Post::chronological);
        assert_eq!(posts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2, 0]);
        posts.sort_by(Post::newest_first);
        assert_eq!(posts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![0, 2, 1]);
    }

    #[test]
    fn test_score_and_payload() {
        let p = post(4, 10);
        assert_eq!(p.score(), -2);
        assert_eq!(p.payload.body, "post 4");
        assert!(!p.is_reply());
        assert!(!p.is_topic());
    }
}
