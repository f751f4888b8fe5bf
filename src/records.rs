//! 记录文件：JSONL 读写（每轮整体重写）与批处理模式的轮次状态文件

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::agents::{MessageRecord, RoleName};

/// 逐行读取 JSONL；空行跳过
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut items = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line)
            .with_context(|| format!("{}:{} is not a valid record", path.display(), lineno + 1))?;
        items.push(item);
    }
    Ok(items)
}

/// 整体重写 JSONL：先写临时文件再改名，中途失败不会留下半个文件
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut w = std::io::BufWriter::new(
            std::fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?,
        );
        for item in items {
            serde_json::to_writer(&mut w, item)?;
            w.write_all(b"\n")?;
        }
        w.flush()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// 读取预处理好的问题文件，取前 `head` 条，清空已有进度后全部从 `start` 角色开始
pub fn load_questions(path: &Path, head: usize, start: RoleName) -> anyhow::Result<Vec<MessageRecord>> {
    let mut records: Vec<MessageRecord> = read_jsonl(path)?;
    records.truncate(head);
    for r in &mut records {
        r.reset_progress(start);
    }
    Ok(records)
}

/// 输出文件存在则从中续跑，否则从问题文件开始
pub fn load_or_init(
    output: &Path,
    input: &Path,
    head: usize,
    start: RoleName,
) -> anyhow::Result<Vec<MessageRecord>> {
    if output.exists() {
        tracing::info!("Loading previous records from {}", output.display());
        read_jsonl(output)
    } else {
        load_questions(input, head, start)
    }
}

/// 批处理模式的轮次状态 `{"running_round": n}`；轮次号即任务名
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    pub running_round: u32,
}

impl RoundState {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn job_name(&self) -> String {
        self.running_round.to_string()
    }
}
