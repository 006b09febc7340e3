//! 追加写日志存储
//!
//! 文件内容始终是一个合法的 JSON 数组 (或每行一个对象的 JSON Lines)。
//! 每次追加都在独占 `flock` 下完成: 打开 → 加锁 → 拼接闭合括号 → fsync → 解锁。
//! 读取方持共享锁, 不会看到写到一半的拼接。

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use aol_core::{AolError, LogConfig, LogEntry, LogFormat, Result};
use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, warn};

/// 回扫闭合括号时每次读取的块大小
const TAIL_WINDOW: u64 = 4096;

/// 日志落点
///
/// Actor 只通过这个接口写日志, 便于替换实现。
#[async_trait]
pub trait LogSink: Send + Sync + 'static {
    /// 追加一条日志; 返回 `Ok` 时条目已持久化
    async fn append(&self, entry: &LogEntry) -> Result<()>;
}

/// 基于文件锁的持久化日志存储
#[derive(Debug, Clone)]
pub struct DurableLogStore {
    path: PathBuf,
    format: LogFormat,
}

impl DurableLogStore {
    /// 创建存储, 文件在首次追加时才创建
    pub fn new(path: impl Into<PathBuf>, format: LogFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        Self::new(config.log_path.clone(), config.format)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// 同步追加 (阻塞于文件锁与磁盘 I/O)
    pub fn append_blocking(&self, entry: &LogEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| AolError::FileOpen {
                path: self.path.clone(),
                source,
            })?;

        FileExt::lock_exclusive(&file).map_err(|source| AolError::LockAcquisition {
            path: self.path.clone(),
            source,
        })?;

        let written = match self.format {
            LogFormat::JsonArray => file
                .metadata()
                .map_err(|e| self.write_error(e))
                .and_then(|meta| self.splice_into_array(&mut file, meta.len(), entry)),
            LogFormat::JsonLines => self.append_line(&mut file, entry),
        };

        // 无论写入成败都要释放锁
        let unlocked = FileExt::unlock(&file).map_err(|source| AolError::LockAcquisition {
            path: self.path.clone(),
            source,
        });
        written?;
        unlocked?;

        debug!(
            timestamp = entry.timestamp(),
            path = %self.path.display(),
            "appended log entry"
        );
        Ok(())
    }

    fn splice_into_array<F: SpliceTarget>(
        &self,
        file: &mut F,
        len: u64,
        entry: &LogEntry,
    ) -> Result<()> {
        let element = render_array_element(entry)?;

        let (offset, chunk) = if len == 0 {
            (0, format!("[\n{element}\n]"))
        } else {
            let splice = self.find_splice_point(file, len)?;
            let separator = if splice.array_empty { "\n" } else { ",\n" };
            (splice.offset, format!("{separator}{element}\n]"))
        };

        // 被覆盖的尾部, 写入失败时原样写回
        let original_tail = self.read_range(file, offset, len)?;

        let written = file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(chunk.as_bytes()))
            .and_then(|_| file.set_len(offset + chunk.len() as u64))
            .and_then(|_| file.sync_all());

        if let Err(e) = written {
            let restored = file
                .seek(SeekFrom::Start(offset))
                .and_then(|_| file.write_all(&original_tail))
                .and_then(|_| file.set_len(len))
                .and_then(|_| file.sync_all());
            if let Err(restore_err) = restored {
                warn!(
                    error = %restore_err,
                    path = %self.path.display(),
                    "failed to roll back partial append"
                );
            }
            return Err(self.write_error(e));
        }
        Ok(())
    }

    fn append_line(&self, file: &mut File, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        file.seek(SeekFrom::End(0))
            .and_then(|_| file.write_all(line.as_bytes()))
            .and_then(|_| file.sync_all())
            .map_err(|e| self.write_error(e))
    }

    /// 定位闭合括号前最后一个非空白字节之后的位置
    fn find_splice_point<F: Read + Seek>(&self, file: &mut F, len: u64) -> Result<SplicePoint> {
        let Some((close, b']')) = self.last_non_whitespace(file, len)? else {
            return Err(self.corrupt("missing closing bracket"));
        };
        let Some((last, byte)) = self.last_non_whitespace(file, close)? else {
            return Err(self.corrupt("no element or opening bracket before closing bracket"));
        };

        Ok(SplicePoint {
            offset: last + 1,
            array_empty: byte == b'[',
        })
    }

    /// 从 `end` 向前按块回扫, 返回最后一个非空白字节的位置和值
    fn last_non_whitespace<F: Read + Seek>(
        &self,
        file: &mut F,
        end: u64,
    ) -> Result<Option<(u64, u8)>> {
        let mut buf = vec![0u8; TAIL_WINDOW as usize];
        let mut end = end;
        while end > 0 {
            let window = end.min(TAIL_WINDOW);
            let start = end - window;
            let chunk = &mut buf[..window as usize];
            file.seek(SeekFrom::Start(start))
                .and_then(|_| file.read_exact(chunk))
                .map_err(|e| self.write_error(e))?;

            if let Some(idx) = chunk.iter().rposition(|b| !b.is_ascii_whitespace()) {
                return Ok(Some((start + idx as u64, chunk[idx])));
            }
            end = start;
        }
        Ok(None)
    }

    fn read_range<F: Read + Seek>(&self, file: &mut F, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(start))
            .and_then(|_| file.by_ref().take(end - start).read_to_end(&mut bytes))
            .map_err(|e| self.write_error(e))?;
        Ok(bytes)
    }

    fn write_error(&self, source: io::Error) -> AolError {
        AolError::Write {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupt(&self, reason: &str) -> AolError {
        AolError::CorruptLog {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl LogSink for DurableLogStore {
    async fn append(&self, entry: &LogEntry) -> Result<()> {
        let store = self.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || store.append_blocking(&entry))
            .await
            .map_err(|e| AolError::Io(io::Error::other(e)))?
    }
}

/// 可被拼接写入的文件
///
/// 拼接逻辑只依赖这几个操作, 测试中可换成会中途写失败的实现。
trait SpliceTarget: Read + Write + Seek {
    fn set_len(&mut self, size: u64) -> io::Result<()>;
    fn sync_all(&mut self) -> io::Result<()>;
}

impl SpliceTarget for File {
    fn set_len(&mut self, size: u64) -> io::Result<()> {
        File::set_len(self, size)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }
}

struct SplicePoint {
    offset: u64,
    array_empty: bool,
}

/// 渲染数组元素: 两空格缩进的多行对象
fn render_array_element(entry: &LogEntry) -> Result<String> {
    let pretty = serde_json::to_string_pretty(entry)?;
    Ok(pretty
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// 日志读取器
///
/// 只按行返回原始内容, 不做结构化解析。
#[derive(Debug, Clone)]
pub struct LogReader {
    path: PathBuf,
}

impl LogReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 在共享锁下读取整个文件; 文件不存在时返回空字符串
    pub fn read_to_string(&self) -> Result<String> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
            Err(source) => {
                return Err(AolError::FileOpen {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        FileExt::lock_shared(&file).map_err(|source| AolError::LockAcquisition {
            path: self.path.clone(),
            source,
        })?;

        let mut contents = String::new();
        let read = file.read_to_string(&mut contents);
        if let Err(e) = FileExt::unlock(&file) {
            warn!(error = %e, path = %self.path.display(), "failed to release shared lock");
        }
        read?;
        Ok(contents)
    }

    /// 读取全部原始行
    pub fn read(&self) -> Result<Vec<String>> {
        Ok(self.read_to_string()?.lines().map(str::to_owned).collect())
    }
}
