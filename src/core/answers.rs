use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::error::AppError;

/// Per-field length ceiling for questionnaire answers, in characters.
pub const MAX_ANSWER_LEN: usize = 280;

/// A participant's questionnaire, as submitted and returned over the wire.
/// All six fields are required; a resubmission overwrites all of them.
#[derive(PartialEq, Eq, Debug, FromRow, Clone, Serialize, Deserialize)]
pub struct Answers {
    #[sqlx(rename = "fav_game")]
    pub game: String,

    #[sqlx(rename = "fav_colour")]
    pub colour: String,

    #[sqlx(rename = "fav_song")]
    pub song: String,

    #[sqlx(rename = "fav_film")]
    pub film: String,

    #[sqlx(rename = "fav_food")]
    pub food: String,

    #[sqlx(rename = "hobby_interest")]
    pub hobby: String,
}

impl Answers {
    fn fields(&self) -> [(&'static str, &str); 6] {
        [
            ("game", &self.game),
            ("colour", &self.colour),
            ("song", &self.song),
            ("film", &self.film),
            ("food", &self.food),
            ("hobby", &self.hobby),
        ]
    }

    /// Checks every required field before anything is written.
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, value) in self.fields() {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "Answer '{}' must not be empty",
                    name
                )));
            }

            if value.chars().count() > MAX_ANSWER_LEN {
                return Err(AppError::Validation(format!(
                    "Answer '{}' exceeds {} characters",
                    name, MAX_ANSWER_LEN
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn sample() -> Answers {
        Answers {
            game: "Outer Wilds".to_owned(),
            colour: "teal".to_owned(),
            song: "Clair de Lune".to_owned(),
            film: "Spirited Away".to_owned(),
            food: "ramen".to_owned(),
            hobby: "bouldering".to_owned(),
        }
    }

    #[test]
    fn test_valid_answers_pass() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_empty_field_rejected() {
        let mut answers = sample();
        answers.film = "   ".to_owned();

        let err = answers.validate().unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("film"));
    }

    #[test]
    fn test_over_length_field_rejected() {
        let mut answers = sample();
        answers.song = "x".repeat(MAX_ANSWER_LEN + 1);

        let err = answers.validate().unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("song"));
    }

    #[test]
    fn test_length_boundary_accepted() {
        let mut answers = sample();
        answers.song = "x".repeat(MAX_ANSWER_LEN);
        assert!(answers.validate().is_ok());
    }
}
