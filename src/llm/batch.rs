//! OpenAI Batch API 网关（提交 / 轮询）
//!
//! 目录布局（job_dir 下，按 job 名区分）：
//! - `{job}.jsonl`：请求文件，每行一个 `/v1/chat/completions` 请求，custom_id = `request-{i}`
//! - `{job}_receipt.json`：提交回执；存在即表示已提交，不会重复提交
//! - `{job}_batch_output.jsonl`：下载后的结果缓存；存在时直接读取，不再访问网络
//!
//! 任务未完成时 fetch_results 返回 Ok(None)，上层不做任何持久化并退出，等待外部调度器重入。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{BatchJobGateway, LlmError, PromptPair};

const CUSTOM_ID_PREFIX: &str = "request-";

/// 提交回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch_id: String,
    pub input_file_id: String,
    pub request_count: usize,
}

/// 批处理任务状态（与 API 的 status 字段对应）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "completed" => BatchStatus::Completed,
            "failed" | "expired" | "cancelled" => BatchStatus::Failed,
            _ => BatchStatus::Pending,
        }
    }
}

pub struct OpenAiBatchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    job_dir: PathBuf,
}

impl OpenAiBatchClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        job_dir: impl AsRef<Path>,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.to_string(),
            job_dir: job_dir.as_ref().to_path_buf(),
        }
    }

    fn request_path(&self, job: &str) -> PathBuf {
        self.job_dir.join(format!("{job}.jsonl"))
    }

    fn receipt_path(&self, job: &str) -> PathBuf {
        self.job_dir.join(format!("{job}_receipt.json"))
    }

    fn output_path(&self, job: &str) -> PathBuf {
        self.job_dir.join(format!("{job}_batch_output.jsonl"))
    }

    fn read_receipt(&self, job: &str) -> Result<BatchReceipt, LlmError> {
        let data = std::fs::read_to_string(self.receipt_path(job))?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn upload(&self, path: &Path) -> Result<String, LlmError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "batch.jsonl".to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "batch")
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));
        let body: Value = self
            .http
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::Batch(e.to_string()))?
            .json()
            .await
            .map_err(|e| LlmError::Batch(e.to_string()))?;
        json_str(&body, "id").ok_or_else(|| LlmError::Batch("upload returned no file id".into()))
    }

    async fn get_json(&self, url: String) -> Result<Value, LlmError> {
        self.http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::Batch(e.to_string()))?
            .json()
            .await
            .map_err(|e| LlmError::Batch(e.to_string()))
    }
}

fn json_str(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(String::from)
}

/// 单行请求：`{"custom_id", "method", "url", "body": {"model", "messages"}}`
pub fn format_request_line(prompt: &PromptPair, model: &str, index: usize) -> Value {
    serde_json::json!({
        "custom_id": format!("{CUSTOM_ID_PREFIX}{index}"),
        "method": "POST",
        "url": "/v1/chat/completions",
        "body": {
            "model": model,
            "messages": prompt.to_messages(),
        },
    })
}

/// 解析结果文件：按 custom_id 归位，缺失或出错的请求为 None
pub fn parse_output_lines(text: &str, expected: Option<usize>) -> Result<Vec<Option<String>>, LlmError> {
    let mut by_index: BTreeMap<usize, Option<String>> = BTreeMap::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let row: Value = serde_json::from_str(line)?;
        let index = row
            .get("custom_id")
            .and_then(|v| v.as_str())
            .and_then(|id| id.strip_prefix(CUSTOM_ID_PREFIX))
            .and_then(|n| n.parse::<usize>().ok());
        let Some(index) = index else {
            tracing::warn!("Batch output line without a usable custom_id, skipped");
            continue;
        };
        let content = row
            .pointer("/response/body/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string());
        by_index.insert(index, content);
    }
    let len = expected
        .or_else(|| by_index.keys().next_back().map(|i| i + 1))
        .unwrap_or(0);
    Ok((0..len)
        .map(|i| by_index.get(&i).cloned().flatten())
        .collect())
}

#[async_trait]
impl BatchJobGateway for OpenAiBatchClient {
    async fn submit(&self, prompts: &[PromptPair], job_name: &str) -> Result<Option<String>, LlmError> {
        if self.receipt_path(job_name).exists() {
            tracing::info!("Job {} already submitted, skipping", job_name);
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.job_dir).await?;
        let mut lines = String::new();
        for (i, prompt) in prompts.iter().enumerate() {
            lines.push_str(&serde_json::to_string(&format_request_line(prompt, &self.model, i))?);
            lines.push('\n');
        }
        let request_path = self.request_path(job_name);
        tokio::fs::write(&request_path, lines).await?;

        let input_file_id = self.upload(&request_path).await?;
        let created: Value = self
            .http
            .post(format!("{}/batches", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "input_file_id": input_file_id,
                "endpoint": "/v1/chat/completions",
                "completion_window": "24h",
                "metadata": {"description": "TableQA batch job"},
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::Batch(e.to_string()))?
            .json()
            .await
            .map_err(|e| LlmError::Batch(e.to_string()))?;
        let batch_id = json_str(&created, "id")
            .ok_or_else(|| LlmError::Batch("batch creation returned no id".into()))?;

        let receipt = BatchReceipt {
            batch_id: batch_id.clone(),
            input_file_id,
            request_count: prompts.len(),
        };
        tokio::fs::write(
            self.receipt_path(job_name),
            serde_json::to_string_pretty(&receipt)?,
        )
        .await?;
        tracing::info!("Submitted batch job {} as {}", job_name, batch_id);
        Ok(Some(batch_id))
    }

    async fn fetch_results(&self, job_name: &str) -> Result<Option<Vec<Option<String>>>, LlmError> {
        let expected = self.read_receipt(job_name).ok().map(|r| r.request_count);
        let output_path = self.output_path(job_name);
        if output_path.exists() {
            tracing::info!("Job {} already fetched, loading cached results", job_name);
            let text = tokio::fs::read_to_string(&output_path).await?;
            return parse_output_lines(&text, expected).map(Some);
        }

        let receipt = self.read_receipt(job_name)?;
        let info = self
            .get_json(format!("{}/batches/{}", self.base_url, receipt.batch_id))
            .await?;
        let status = json_str(&info, "status").unwrap_or_default();
        tracing::info!("Batch job {} status: {}", job_name, status);
        match BatchStatus::from_api(&status) {
            BatchStatus::Pending => return Ok(None),
            BatchStatus::Failed => {
                return Err(LlmError::Batch(format!("job {job_name} ended with status {status}")))
            }
            BatchStatus::Completed => {}
        }

        let output_file_id = json_str(&info, "output_file_id")
            .ok_or_else(|| LlmError::Batch("completed job has no output file".into()))?;
        let text = self
            .http
            .get(format!("{}/files/{}/content", self.base_url, output_file_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::Batch(e.to_string()))?
            .text()
            .await
            .map_err(|e| LlmError::Batch(e.to_string()))?;
        tokio::fs::write(&output_path, &text).await?;
        parse_output_lines(&text, Some(receipt.request_count)).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_line(index: usize, content: &str) -> String {
        serde_json::json!({
            "custom_id": format!("request-{index}"),
            "response": {"body": {"choices": [{"message": {"content": content}}]}},
        })
        .to_string()
    }

    #[test]
    fn test_request_line_shape() {
        let line = format_request_line(&PromptPair::new("sys", "usr"), "gpt-4o-mini", 7);
        assert_eq!(line["custom_id"], "request-7");
        assert_eq!(line["body"]["messages"][0]["role"], "system");
        assert_eq!(line["body"]["messages"][1]["content"], "usr");
    }

    #[test]
    fn test_output_is_ordered_by_custom_id() {
        let text = [output_line(1, " b "), output_line(0, "a")].join("\n");
        let out = parse_output_lines(&text, Some(3)).unwrap();
        assert_eq!(out, vec![Some("a".into()), Some("b".into()), None]);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(BatchStatus::from_api("in_progress"), BatchStatus::Pending);
        assert_eq!(BatchStatus::from_api("finalizing"), BatchStatus::Pending);
        assert_eq!(BatchStatus::from_api("completed"), BatchStatus::Completed);
        assert_eq!(BatchStatus::from_api("expired"), BatchStatus::Failed);
    }

    #[tokio::test]
    async fn test_existing_receipt_skips_submission() {
        let dir = tempfile::tempdir().unwrap();
        let client = OpenAiBatchClient::new(None, "m", Some("k"), dir.path());
        let receipt = BatchReceipt {
            batch_id: "b1".into(),
            input_file_id: "f1".into(),
            request_count: 1,
        };
        std::fs::write(
            dir.path().join("0_receipt.json"),
            serde_json::to_string(&receipt).unwrap(),
        )
        .unwrap();
        let res = client.submit(&[PromptPair::new("s", "u")], "0").await.unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn test_cached_output_is_read_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let client = OpenAiBatchClient::new(None, "m", Some("k"), dir.path());
        std::fs::write(dir.path().join("3_batch_output.jsonl"), output_line(0, "hello")).unwrap();
        let res = client.fetch_results("3").await.unwrap();
        assert_eq!(res, Some(vec![Some("hello".to_string())]));
    }
}
