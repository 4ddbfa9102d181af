//! Likes and saves on one post, as one user sees them.
//!
//! Toggles are optimistic: the local state changes first, then the write goes to the backend. Each
//! toggle hands back a snapshot of the state before it, and a failed write restores that snapshot,
//! so the state returned to the user never shows a change the backend rejected.
use crate::backend::Backend;
use crate::facade::Snapgram;
use crate::twoface::Fallible;
use serde::Serialize;
use tracing::warn;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PostStats {
    pub post_id: String,
    pub user_id: String,
    /// Ids of the users liking the post. Never holds an id twice.
    pub likes: Vec<String>,
    /// Id of this user's save record for the post.
    #[serde(skip)]
    pub saved_record: Option<String>,
    pub save_count: u64,
}

/// State of a `PostStats` before a toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    likes: Vec<String>,
    saved_record: Option<String>,
    save_count: u64,
}

/// What a save toggle asks the backend to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveChange {
    Save,
    Unsave { record_id: String },
}

impl PostStats {
    /// Read the post's likes, this user's save record and the save count.
    pub async fn load<B: Backend>(
        snapgram: &Snapgram<B>,
        user_id: &str,
        post_id: &str,
    ) -> Fallible<Self> {
        let post = snapgram.get_post(post_id).await?;
        let saved_record = snapgram.find_saved_record(user_id, post_id).await?;
        let save_count = snapgram.count_saved_post(post_id).await?;
        let mut likes: Vec<String> = Vec::with_capacity(post.likes.len());
        for id in post.likes {
            if !likes.contains(&id) {
                likes.push(id);
            }
        }
        Ok(Self {
            post_id: post.id,
            user_id: user_id.to_owned(),
            likes,
            saved_record: saved_record.map(|save| save.id),
            save_count,
        })
    }

    pub fn is_liked(&self) -> bool {
        self.likes.iter().any(|id| *id == self.user_id)
    }

    pub fn is_saved(&self) -> bool {
        self.saved_record.is_some()
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            likes: self.likes.clone(),
            saved_record: self.saved_record.clone(),
            save_count: self.save_count,
        }
    }

    /// Add this user's like, or take it away if it's there.
    pub fn toggle_like(&mut self) -> Snapshot {
        let before = self.snapshot();
        if self.is_liked() {
            let user_id = &self.user_id;
            self.likes.retain(|id| id != user_id);
        } else {
            self.likes.push(self.user_id.clone());
        }
        before
    }

    /// Flip the saved flag and the count. The new record's id is only known once the backend
    /// answers, see `confirm_saved`.
    pub fn toggle_save(&mut self) -> (Snapshot, SaveChange) {
        let before = self.snapshot();
        let change = match self.saved_record.take() {
            Some(record_id) => {
                self.save_count = self.save_count.saturating_sub(1);
                SaveChange::Unsave { record_id }
            }
            None => {
                self.saved_record = Some(String::new());
                self.save_count += 1;
                SaveChange::Save
            }
        };
        (before, change)
    }

    pub fn confirm_saved(&mut self, record_id: String) {
        self.saved_record = Some(record_id);
    }

    pub fn rollback(&mut self, snapshot: Snapshot) {
        self.likes = snapshot.likes;
        self.saved_record = snapshot.saved_record;
        self.save_count = snapshot.save_count;
    }

    /// Toggle the like and write the resulting liker list.
    pub async fn like<B: Backend>(&mut self, snapgram: &Snapgram<B>) -> Fallible<()> {
        let before = self.toggle_like();
        if let Err(e) = snapgram.like_post(&self.post_id, &self.likes).await {
            warn!(post_id = %self.post_id, "like failed, rolling back");
            self.rollback(before);
            return Err(e);
        }
        Ok(())
    }

    /// Toggle the save and create or delete the save record.
    pub async fn save<B: Backend>(&mut self, snapgram: &Snapgram<B>) -> Fallible<()> {
        let (before, change) = self.toggle_save();
        let result = match change {
            SaveChange::Save => match snapgram.save_post(&self.user_id, &self.post_id).await {
                Ok(save) => {
                    self.confirm_saved(save.id);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            SaveChange::Unsave { record_id } => snapgram.delete_saved_post(&record_id).await,
        };
        if let Err(e) = result {
            warn!(post_id = %self.post_id, "save failed, rolling back");
            self.rollback(before);
            return Err(e);
        }
        Ok(())
    }
}
