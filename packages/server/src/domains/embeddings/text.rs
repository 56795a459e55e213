//! Text fed to the embedding model for postings and users.

use crate::domains::postings::{Posting, UserProfile};

/// Descriptions beyond this many characters are cut before embedding.
pub const MAX_DESCRIPTION_CHARS: usize = 32_000;

/// `title \n company \n location \n description`, missing fields empty.
pub fn posting_text(posting: &Posting) -> String {
    let description = posting.description.as_deref().unwrap_or_default();
    let description: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();

    format!(
        "{}\n{}\n{}\n{}",
        posting.title,
        posting.company.as_deref().unwrap_or_default(),
        posting.location.as_deref().unwrap_or_default(),
        description
    )
    .trim()
    .to_string()
}

/// `name \n skills \n resume text`, skills joined by spaces.
pub fn user_text(user: &UserProfile) -> String {
    format!(
        "{}\n{}\n{}",
        user.name.as_deref().unwrap_or_default(),
        user.skills.join(" "),
        user.resume_text.as_deref().unwrap_or_default()
    )
    .trim()
    .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::common::PostingId;

    fn posting(description: Option<String>) -> Posting {
        let now = Utc::now();
        Posting {
            id: PostingId::new(),
            title: "Rust Engineer".into(),
            company: None,
            location: Some("Remote".into()),
            description,
            tags: vec![],
            salary: None,
            source_url: "https://remoteok.com/remote-jobs/1".into(),
            source_site: "REMOTEOK".into(),
            scraped_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_posting_text_keeps_field_positions() {
        assert_eq!(
            posting_text(&posting(Some("Build things".into()))),
            "Rust Engineer\n\nRemote\nBuild things"
        );
        assert_eq!(posting_text(&posting(None)), "Rust Engineer\n\nRemote");
    }

    #[test]
    fn test_posting_text_truncates_description() {
        let long = "é".repeat(MAX_DESCRIPTION_CHARS + 50);
        let text = posting_text(&posting(Some(long)));
        let description = text.rsplit('\n').next().unwrap();
        assert_eq!(description.chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_user_text() {
        let user = UserProfile::new("u1")
            .with_name("Ada")
            .with_skills(["rust", "sql"])
            .with_resume_text("Ten years of systems work. ");
        assert_eq!(user_text(&user), "Ada\nrust sql\nTen years of systems work.");

        assert_eq!(user_text(&UserProfile::new("u2").with_skills(["go"])), "go");
    }
}
