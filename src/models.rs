//! The app's own records, decoded from backend documents.
use crate::backend::structs::FileUpload;
use chrono::{offset::Utc, DateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user of the app. The document id is the id of the auth account behind it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "accountId")]
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub username: String,
    pub email: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

/// A post from a user
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Post {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "references::one")]
    pub creator: String,
    #[serde(default)]
    pub caption: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    /// Storage id of the image.
    #[serde(rename = "imageId")]
    pub image_id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ids of the users who like this post.
    #[serde(default, deserialize_with = "references::many")]
    pub likes: Vec<String>,
}

impl Post {
    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }
}

/// A user's bookmark of a post.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Save {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(deserialize_with = "references::one")]
    pub user: String,
    #[serde(deserialize_with = "references::one")]
    pub post: String,
}

/// What a new user signs up with.
#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("email", &self.email)
            .finish()
    }
}

/// A post about to be created, with its one image.
#[derive(Clone, Debug)]
pub struct NewPost {
    pub creator: String,
    pub caption: String,
    pub file: FileUpload,
    pub location: String,
    /// Comma-separated, as typed.
    pub tags: String,
}

/// Split a typed tag list: spaces are dropped, commas separate, empty tags are skipped.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.replace(' ', "")
        .split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Relationship attributes come back either as a bare id or as the expanded document.
mod references {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Reference {
        Id(String),
        Expanded {
            #[serde(rename = "$id")]
            id: String,
        },
    }

    impl Reference {
        fn into_id(self) -> String {
            match self {
                Self::Id(id) | Self::Expanded { id } => id,
            }
        }
    }

    pub fn one<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Reference::deserialize(d).map(Reference::into_id)
    }

    pub fn many<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let refs: Option<Vec<Reference>> = Option::deserialize(d)?;
        Ok(refs
            .unwrap_or_default()
            .into_iter()
            .map(Reference::into_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_split_and_stripped() {
        assert_eq!(
            parse_tags("art, travel, education"),
            vec!["art", "travel", "education"]
        );
        assert_eq!(parse_tags("art,,  travel ,"), vec!["art", "travel"]);
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" , ").is_empty());
    }

    #[test]
    fn test_post_decodes_expanded_relationships() {
        let post: Post = serde_json::from_str(
            r#"{
                "$id": "p1",
                "$createdAt": "2024-05-01T10:00:00.000+00:00",
                "creator": {"$id": "u1", "name": "Ada"},
                "caption": "hello",
                "imageURL": "https://img/1",
                "imageId": "f1",
                "location": "London",
                "tags": ["art"],
                "likes": [{"$id": "u2"}, "u3"]
            }"#,
        )
        .unwrap();
        assert_eq!(post.creator, "u1");
        assert_eq!(post.likes, vec!["u2", "u3"]);
        assert!(post.is_liked_by("u3"));
        assert!(!post.is_liked_by("u1"));
    }

    #[test]
    fn test_post_without_likes() {
        let post: Post = serde_json::from_str(
            r#"{
                "$id": "p1",
                "$createdAt": "2024-05-01T10:00:00.000+00:00",
                "creator": "u1",
                "imageURL": "https://img/1",
                "imageId": "f1",
                "likes": null
            }"#,
        )
        .unwrap();
        assert!(post.likes.is_empty());
        assert!(post.tags.is_empty());
    }
}
