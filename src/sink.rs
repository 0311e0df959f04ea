use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// In-memory writer that can be cloned and read back.
///
/// Every clone appends to the same buffer, so one clone can be handed to a
/// [`GcpHandler`](crate::handler::GcpHandler) while another inspects the
/// lines it wrote. Useful in tests and for callers that forward encoded
/// records themselves.
#[derive(Clone, Default, Debug)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Written output split into lines, without the trailing newlines.
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.contents())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn clear(&self) {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_buffer() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.write_all(b"{\"a\":1}\n{\"b\":2}\n").unwrap();
        assert_eq!(sink.lines(), vec!["{\"a\":1}", "{\"b\":2}"]);
        sink.clear();
        assert!(sink.contents().is_empty());
    }
}
