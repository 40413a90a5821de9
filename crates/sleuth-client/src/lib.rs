//! Client for the course evaluation API.
//!
//! Questions and their attachments are cached on disk: the processed
//! question list in `questions.json`, downloaded files under the
//! attachments directory keyed by file name. Computed answers are written
//! back into the question cache so a run can be resumed and submitted
//! later.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sleuth_core::config::EvalApiConfig;
use sleuth_core::error::{Result, SleuthError};

/// One question as the API returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiQuestion {
    pub task_id: String,
    pub question: String,
    #[serde(rename = "Level", default)]
    pub level: Option<String>,
    #[serde(default)]
    pub file_name: String,
}

/// One question as cached locally, with its downloaded attachment and any
/// recorded answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub task_id: String,
    pub question: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub skip: Option<bool>,
}

impl Question {
    /// The attachment path, if the question has one.
    pub fn attachment(&self) -> Option<&Path> {
        if self.file_path.is_empty() {
            None
        } else {
            Some(Path::new(&self.file_path))
        }
    }
}

/// One entry of a submission payload.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerSubmission {
    pub task_id: String,
    pub submitted_answer: String,
}

/// The scoring response for a submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionResult {
    pub username: String,
    pub score: f64,
    #[serde(default)]
    pub correct_count: u32,
    #[serde(default)]
    pub total_attempted: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

pub struct EvalClient {
    http: reqwest::Client,
    base_url: String,
    questions_json_path: PathBuf,
    attachments_dir: PathBuf,
}

impl EvalClient {
    pub fn new(config: &EvalApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            questions_json_path: config.questions_json_path(),
            attachments_dir: config.attachments_dir(),
        }
    }

    /// The full question list, from cache when present.
    ///
    /// On a cache miss the list is fetched, every attachment is
    /// downloaded, and the processed result is cached. A failed attachment
    /// download leaves that question's `file_path` empty rather than
    /// failing the whole fetch.
    pub async fn get_questions(&self) -> Result<Vec<Question>> {
        if self.questions_json_path.exists() {
            debug!(path = %self.questions_json_path.display(), "loading questions from cache");
            return load_cache(&self.questions_json_path);
        }

        let api_questions: Vec<ApiQuestion> = self
            .get_json(&format!("{}/questions", self.base_url))
            .await?;
        info!(count = api_questions.len(), "fetched questions from API");

        let mut questions = Vec::with_capacity(api_questions.len());
        for api_question in api_questions {
            questions.push(self.process_question(api_question).await);
        }

        save_cache(&self.questions_json_path, &questions)?;
        Ok(questions)
    }

    /// One random question, with its attachment downloaded.
    pub async fn get_random_question(&self) -> Result<Question> {
        let api_question: ApiQuestion = self
            .get_json(&format!("{}/random-question", self.base_url))
            .await?;
        Ok(self.process_question(api_question).await)
    }

    /// Download a task's attachment, from cache when present.
    pub async fn get_file(&self, task_id: &str, file_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.attachments_dir)?;
        let file_path = self.attachments_dir.join(file_name);

        if file_path.exists() {
            debug!(path = %file_path.display(), "attachment already cached");
            return Ok(file_path);
        }

        let url = format!("{}/files/{}", self.base_url, task_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SleuthError::Api(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SleuthError::Api(format!("GET {} returned {}", url, status)));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SleuthError::Api(e.to_string()))?;

        tokio::fs::write(&file_path, &bytes).await?;
        info!(path = %file_path.display(), "attachment downloaded");
        Ok(file_path)
    }

    /// Record a computed answer against the cached question list.
    pub fn record_answer(&self, task_id: &str, answer: &str) -> Result<()> {
        let mut questions = load_cache(&self.questions_json_path)?;
        let Some(question) = questions.iter_mut().find(|q| q.task_id == task_id) else {
            return Err(SleuthError::Api(format!(
                "task {} not found in question cache",
                task_id
            )));
        };
        question.answer = Some(answer.to_string());
        save_cache(&self.questions_json_path, &questions)
    }

    /// Submit recorded answers for scoring.
    pub async fn submit_answers(
        &self,
        username: &str,
        agent_code: &str,
        answers: &[AnswerSubmission],
    ) -> Result<SubmissionResult> {
        let url = format!("{}/submit", self.base_url);
        let payload = serde_json::json!({
            "username": username,
            "agent_code": agent_code,
            "answers": answers,
        });

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SleuthError::Api(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SleuthError::Api(format!(
                "POST {} returned {}",
                url, status
            )));
        }
        response
            .json()
            .await
            .map_err(|e| SleuthError::Api(e.to_string()))
    }

    async fn process_question(&self, api_question: ApiQuestion) -> Question {
        let file_path = if api_question.file_name.is_empty() {
            String::new()
        } else {
            match self
                .get_file(&api_question.task_id, &api_question.file_name)
                .await
            {
                Ok(path) => path.display().to_string(),
                Err(e) => {
                    warn!(task_id = %api_question.task_id, error = %e, "attachment download failed");
                    String::new()
                }
            }
        };

        Question {
            task_id: api_question.task_id,
            question: api_question.question,
            file_path,
            answer: None,
            skip: None,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SleuthError::Api(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SleuthError::Api(format!("GET {} returned {}", url, status)));
        }
        response
            .json()
            .await
            .map_err(|e| SleuthError::Api(e.to_string()))
    }
}

fn load_cache(path: &Path) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn save_cache(path: &Path, questions: &[Question]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(questions)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(dir: &Path) -> EvalClient {
        let config = EvalApiConfig {
            base_url: "http://localhost:0".into(),
            questions_dir: dir.display().to_string(),
            username: None,
            agent_code: None,
        };
        EvalClient::new(&config)
    }

    fn sample_questions() -> Vec<Question> {
        vec![
            Question {
                task_id: "t1".into(),
                question: "What is 2+2?".into(),
                file_path: String::new(),
                answer: None,
                skip: None,
            },
            Question {
                task_id: "t2".into(),
                question: "Sum the attached table.".into(),
                file_path: "/tmp/table.csv".into(),
                answer: None,
                skip: Some(true),
            },
        ]
    }

    #[tokio::test]
    async fn test_cached_questions_skip_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let c = client(dir.path());
        save_cache(&c.questions_json_path, &sample_questions()).unwrap();

        // base_url is unreachable, so this passing proves the cache hit.
        let questions = c.get_questions().await.unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].task_id, "t1");
        assert!(questions[0].attachment().is_none());
        assert_eq!(questions[1].attachment(), Some(Path::new("/tmp/table.csv")));
    }

    #[tokio::test]
    async fn test_cached_file_skips_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let c = client(dir.path());
        std::fs::create_dir_all(&c.attachments_dir).unwrap();
        std::fs::write(c.attachments_dir.join("data.csv"), "a,b\n").unwrap();

        let path = c.get_file("t2", "data.csv").await.unwrap();
        assert_eq!(path, c.attachments_dir.join("data.csv"));
    }

    #[test]
    fn test_record_answer_updates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let c = client(dir.path());
        save_cache(&c.questions_json_path, &sample_questions()).unwrap();

        c.record_answer("t1", "4").unwrap();

        let questions = load_cache(&c.questions_json_path).unwrap();
        assert_eq!(questions[0].answer.as_deref(), Some("4"));
        assert!(questions[1].answer.is_none());

        let err = c.record_answer("missing", "x").unwrap_err();
        assert!(matches!(err, SleuthError::Api(_)));
    }

    #[test]
    fn test_api_question_level_field_shape() {
        let q: ApiQuestion = serde_json::from_str(
            r#"{"task_id": "t1", "question": "q", "Level": "1", "file_name": ""}"#,
        )
        .unwrap();
        assert_eq!(q.level.as_deref(), Some("1"));
        assert!(q.file_name.is_empty());
    }
}
