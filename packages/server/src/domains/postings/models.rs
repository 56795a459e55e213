use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::common::{PostingId, UserId};

/// A canonical job listing. `source_url` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Posting {
    pub id: PostingId,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub salary: Option<String>,
    pub source_url: String,
    pub source_site: String,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for upserting a posting by URL.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewPosting {
    pub title: String,
    #[builder(default)]
    pub company: Option<String>,
    #[builder(default)]
    pub location: Option<String>,
    #[builder(default)]
    pub description: Option<String>,
    #[builder(default)]
    pub tags: Vec<String>,
    #[builder(default)]
    pub salary: Option<String>,
    pub source_url: String,
    pub source_site: String,
}

/// A posting together with its stored embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPosting {
    pub posting: Posting,
    pub vector: Vec<f32>,
}

/// The slice of an external user profile the pipeline reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: Option<String>,
    pub skills: Vec<String>,
    pub resume_text: Option<String>,
    pub vector: Option<Vec<f32>>,
}

impl UserProfile {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            skills: Vec::new(),
            resume_text: None,
            vector: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_skills<S: Into<String>>(mut self, skills: impl IntoIterator<Item = S>) -> Self {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resume_text(mut self, text: impl Into<String>) -> Self {
        self.resume_text = Some(text.into());
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }
}
