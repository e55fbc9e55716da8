use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{ser_opt_timestamp, ser_timestamp, Document};
use crate::error::FieldViolation;
use crate::validation::{known_variant, Choice};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SurveyType {
    Daily,
    Weekly,
    Monthly,
    Initial,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mood,
    Scale,
    MultipleChoice,
    Text,
    Boolean,
    Rating,
}

const MAX_TEXT_ANSWER: usize = 2000;

/// The answer shapes a survey question can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Boolean(bool),
    /// Position in a multiple-choice question's options, or a whole-number score.
    OptionIndex(u32),
    Number(f64),
    Text(String),
}

impl Answer {
    fn as_number(&self) -> Option<f64> {
        match self {
            Answer::OptionIndex(i) => Some(f64::from(*i)),
            Answer::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Question {
    fn bounds(&self) -> (f64, f64) {
        let (min, max) = match self.kind {
            QuestionType::Mood => (1.0, 5.0),
            QuestionType::Scale => (1.0, 10.0),
            QuestionType::Rating => (1.0, 5.0),
            _ => (f64::MIN, f64::MAX),
        };
        (self.min.unwrap_or(min), self.max.unwrap_or(max))
    }

    /// Check that `answer` has the shape and range this question accepts.
    pub fn check_answer(&self, answer: &Answer) -> Result<(), String> {
        match self.kind {
            QuestionType::Mood | QuestionType::Scale | QuestionType::Rating => {
                let (min, max) = self.bounds();
                match answer.as_number() {
                    Some(n) if n >= min && n <= max => Ok(()),
                    Some(_) => Err(format!(
                        "Answer to `{}` must be between {} and {}",
                        self.id, min, max
                    )),
                    None => Err(format!("Answer to `{}` must be a number", self.id)),
                }
            }
            QuestionType::Boolean => match answer {
                Answer::Boolean(_) => Ok(()),
                _ => Err(format!("Answer to `{}` must be true or false", self.id)),
            },
            QuestionType::Text => match answer {
                Answer::Text(t) if t.chars().count() <= MAX_TEXT_ANSWER => Ok(()),
                Answer::Text(_) => Err(format!(
                    "Answer to `{}` cannot exceed {} characters",
                    self.id, MAX_TEXT_ANSWER
                )),
                _ => Err(format!("Answer to `{}` must be text", self.id)),
            },
            QuestionType::MultipleChoice => {
                let options = self.options.as_deref().unwrap_or_default();
                let valid = match answer {
                    Answer::Text(t) => options.iter().any(|o| o == t),
                    Answer::OptionIndex(i) => (*i as usize) < options.len(),
                    _ => false,
                };
                if valid {
                    Ok(())
                } else {
                    Err(format!("Answer to `{}` must be one of its options", self.id))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub question_id: String,
    pub answer: Answer,
    #[serde(serialize_with = "ser_timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: SurveyType,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub responses: Vec<SurveyResponse>,
    #[serde(default, serialize_with = "ser_opt_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "ser_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for Survey {
    const COLLECTION: &'static str = "surveys";
    const LABEL: &'static str = "Survey";
}

impl Survey {
    /// Record answers, replacing any earlier answer to the same question.
    pub fn record_answers(
        &mut self,
        answers: Vec<AnswerInput>,
        now: DateTime<Utc>,
    ) -> Result<(), Vec<FieldViolation>> {
        let mut violations = Vec::new();
        for (i, input) in answers.iter().enumerate() {
            let field = format!("responses.{i}.answer");
            match self.questions.iter().find(|q| q.id == input.question_id) {
                None => violations.push(FieldViolation::new(
                    format!("responses.{i}.questionId"),
                    format!("Question `{}` is not part of this survey", input.question_id),
                )),
                Some(q) => {
                    if let Err(msg) = q.check_answer(&input.answer) {
                        violations.push(FieldViolation::new(field, msg));
                    }
                }
            }
        }
        if !violations.is_empty() {
            return Err(violations);
        }

        for input in answers {
            self.responses.retain(|r| r.question_id != input.question_id);
            self.responses.push(SurveyResponse {
                question_id: input.question_id,
                answer: input.answer,
                timestamp: now,
            });
        }
        Ok(())
    }

    pub fn unanswered_required(&self) -> Vec<&str> {
        self.questions
            .iter()
            .filter(|q| q.required)
            .filter(|q| !self.responses.iter().any(|r| r.question_id == q.id))
            .map(|q| q.id.as_str())
            .collect()
    }

    /// Mark the survey completed. Fails if it already is or if a required
    /// question has no answer.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), Vec<FieldViolation>> {
        if self.is_completed {
            return Err(vec![FieldViolation::new(
                "isCompleted",
                "Survey has already been completed",
            )]);
        }
        let missing = self.unanswered_required();
        if !missing.is_empty() {
            return Err(missing
                .into_iter()
                .map(|id| {
                    FieldViolation::new("responses", format!("Question `{id}` requires an answer"))
                })
                .collect());
        }
        self.completed_at = Some(now);
        self.is_completed = true;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    #[validate(
        required(message = "Question id is required"),
        length(min = 1, message = "Question id is required")
    )]
    pub id: Option<String>,

    #[serde(rename = "type")]
    #[validate(required(message = "Question type is required"), custom(function = "known_variant"))]
    pub kind: Option<Choice<QuestionType>>,

    #[validate(
        required(message = "Question text is required"),
        length(max = 500, message = "Question cannot exceed 500 characters")
    )]
    pub question: Option<String>,

    pub options: Option<Vec<String>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub required: Option<bool>,
    pub category: Option<String>,
}

impl QuestionInput {
    fn into_question(self) -> Option<Question> {
        Some(Question {
            id: self.id?,
            kind: self.kind?.known()?,
            question: self.question?,
            options: self.options,
            min: self.min,
            max: self.max,
            required: self.required.unwrap_or(false),
            category: self.category,
        })
    }
}

fn into_questions(inputs: Vec<QuestionInput>) -> Option<Vec<Question>> {
    inputs.into_iter().map(QuestionInput::into_question).collect()
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSurveyRequest {
    #[serde(rename = "type")]
    #[validate(required(message = "Survey type is required"), custom(function = "known_variant"))]
    pub kind: Option<Choice<SurveyType>>,

    #[validate(required(message = "Questions are required"), nested)]
    pub questions: Option<Vec<QuestionInput>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSurvey {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: SurveyType,
    pub questions: Vec<Question>,
    pub responses: Vec<SurveyResponse>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
}

impl CreateSurveyRequest {
    pub fn into_new(self, user_id: Uuid) -> Option<NewSurvey> {
        Some(NewSurvey {
            user_id,
            kind: self.kind?.known()?,
            questions: into_questions(self.questions?)?,
            responses: Vec::new(),
            completed_at: None,
            is_completed: false,
        })
    }
}

/// Partial update of a survey's definition. Completion state is not writable
/// here.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSurveyRequest {
    #[serde(rename = "type")]
    #[validate(custom(function = "known_variant"))]
    pub kind: Option<Choice<SurveyType>>,

    #[validate(nested)]
    pub questions: Option<Vec<QuestionInput>>,
}

#[derive(Debug, Serialize)]
pub struct SurveyPatch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<SurveyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<Question>>,
}

impl UpdateSurveyRequest {
    pub fn into_patch(self) -> Option<SurveyPatch> {
        let questions = match self.questions {
            Some(inputs) => Some(into_questions(inputs)?),
            None => None,
        };
        Some(SurveyPatch {
            kind: self.kind.and_then(Choice::known),
            questions,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerInput {
    pub question_id: String,
    pub answer: Answer,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitResponsesRequest {
    #[validate(length(min = 1, message = "At least one response is required"))]
    pub responses: Vec<AnswerInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyQuery {
    #[serde(rename = "type")]
    pub kind: Option<SurveyType>,
    pub is_completed: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(kind: QuestionType, required: bool) -> Question {
        Question {
            id: format!("{kind:?}").to_lowercase(),
            kind,
            question: "How is it going?".into(),
            options: (kind == QuestionType::MultipleChoice)
                .then(|| vec!["Mostly calm".into(), "Restless".into()]),
            min: None,
            max: None,
            required,
            category: None,
        }
    }

    fn survey() -> Survey {
        let now = Utc::now();
        Survey {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: SurveyType::Daily,
            questions: vec![
                question(QuestionType::Mood, true),
                question(QuestionType::Boolean, false),
                question(QuestionType::MultipleChoice, true),
            ],
            responses: Vec::new(),
            completed_at: None,
            is_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn answers(value: serde_json::Value) -> Vec<AnswerInput> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_answer_shapes_deserialize() {
        let parsed: Vec<Answer> = serde_json::from_value(json!([true, 2, 3.5, "Restless"])).unwrap();
        assert_eq!(
            parsed,
            vec![
                Answer::Boolean(true),
                Answer::OptionIndex(2),
                Answer::Number(3.5),
                Answer::Text("Restless".into())
            ]
        );
    }

    #[test]
    fn test_check_answer_per_type() {
        let mood = question(QuestionType::Mood, true);
        assert!(mood.check_answer(&Answer::OptionIndex(4)).is_ok());
        assert!(mood.check_answer(&Answer::OptionIndex(6)).is_err());
        assert!(mood.check_answer(&Answer::Text("happy".into())).is_err());

        let rating = Question {
            max: Some(10.0),
            ..question(QuestionType::Rating, false)
        };
        assert!(rating.check_answer(&Answer::Number(9.5)).is_ok());

        let choice = question(QuestionType::MultipleChoice, false);
        assert!(choice.check_answer(&Answer::Text("Restless".into())).is_ok());
        assert!(choice.check_answer(&Answer::OptionIndex(1)).is_ok());
        assert!(choice.check_answer(&Answer::OptionIndex(2)).is_err());
        assert!(choice.check_answer(&Answer::Text("Elated".into())).is_err());

        let boolean = question(QuestionType::Boolean, false);
        assert!(boolean.check_answer(&Answer::Boolean(false)).is_ok());
        assert!(boolean.check_answer(&Answer::OptionIndex(0)).is_err());
    }

    #[test]
    fn test_record_answers_replaces_earlier_answer() {
        let mut s = survey();
        let now = Utc::now();
        s.record_answers(answers(json!([{ "questionId": "mood", "answer": 2 }])), now)
            .unwrap();
        s.record_answers(answers(json!([{ "questionId": "mood", "answer": 4 }])), now)
            .unwrap();
        assert_eq!(s.responses.len(), 1);
        assert_eq!(s.responses[0].answer, Answer::OptionIndex(4));
    }

    #[test]
    fn test_record_answers_is_all_or_nothing() {
        let mut s = survey();
        let err = s
            .record_answers(
                answers(json!([
                    { "questionId": "mood", "answer": 3 },
                    { "questionId": "boolean", "answer": "yes" },
                    { "questionId": "nope", "answer": 1 }
                ])),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(err[0].field, "responses.1.answer");
        assert_eq!(err[1].field, "responses.2.questionId");
        assert!(s.responses.is_empty());
    }

    #[test]
    fn test_complete_requires_required_answers() {
        let mut s = survey();
        let err = s.complete(Utc::now()).unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(!s.is_completed);
        assert!(s.completed_at.is_none());

        s.record_answers(
            answers(json!([
                { "questionId": "mood", "answer": 3 },
                { "questionId": "multiplechoice", "answer": "Mostly calm" }
            ])),
            Utc::now(),
        )
        .unwrap();
        let now = Utc::now();
        s.complete(now).unwrap();
        assert!(s.is_completed);
        assert_eq!(s.completed_at, Some(now));
        assert!(s.complete(Utc::now()).is_err());
    }

    #[test]
    fn test_create_request_rejects_unknown_types() {
        let req: CreateSurveyRequest = serde_json::from_value(json!({
            "type": "hourly",
            "questions": [{ "id": "q1", "type": "essay", "question": "Why?" }]
        }))
        .unwrap();
        let v = crate::validation::violations(&req.validate().unwrap_err());
        let fields: Vec<_> = v.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["questions.0.type", "type"]);
    }

    #[test]
    fn test_create_request_converts() {
        let req: CreateSurveyRequest = serde_json::from_value(json!({
            "type": "weekly",
            "questions": [{ "id": "q1", "type": "scale", "question": "Stress?", "required": true }]
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        let new = req.into_new(Uuid::new_v4()).unwrap();
        assert_eq!(new.kind, SurveyType::Weekly);
        assert_eq!(new.questions[0].kind, QuestionType::Scale);
        assert!(!new.is_completed);
    }
}
