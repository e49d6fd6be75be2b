//! NDJSON 行缓冲
//!
//! 按 `\n` 切分字节流，跨读取缓存不完整的尾行。
//! 只在字节层面切分，因此多字节 UTF-8 字符被拆在两次读取之间也不会损坏。

/// 行缓冲器
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    /// `buffer` 中已确认不含换行符的前缀长度
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加数据并取出所有完整的行
    ///
    /// 返回的行不含换行符（`\r\n` 中的 `\r` 也会去掉），空白行被跳过。
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(pos) = self.buffer[from..].iter().position(|b| *b == b'\n') {
            let end = from + pos;
            let mut line = &self.buffer[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line.to_vec());
            }
            start = end + 1;
            from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// 尚未形成完整行的字节数
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// 丢弃未完成的尾行，返回被丢弃的字节数
    pub fn discard(&mut self) -> usize {
        let len = self.buffer.len();
        self.buffer.clear();
        self.scanned = 0;
        len
    }
}
