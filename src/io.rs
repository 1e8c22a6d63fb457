use std::fs::File;
use std::ops::Deref;

/// The bytes of a trace file, either memory mapped or buffered in memory
pub enum TraceBytes {
    #[cfg(unix)]
    Mapped(memmap2::Mmap),
    Buffered(Vec<u8>),
}

impl Deref for TraceBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            #[cfg(unix)]
            TraceBytes::Mapped(m) => m,
            TraceBytes::Buffered(v) => v,
        }
    }
}

pub fn read_trace(file: File) -> Result<TraceBytes, String> {
    // Compatibility on other systems
    #[cfg(not(unix))]
    {
        use std::io::Read;
        let mut file = file;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|e| format!("Couldn't read the trace file: {e}"))?;
        Ok(TraceBytes::Buffered(buf))
    }
    // Memory map the file for speed on unix systems
    #[cfg(unix)]
    {
        use memmap2::{Advice, Mmap};
        // The trace is consumed front to back, so advise sequential access
        unsafe {
            let m = Mmap::map(&file).map_err(|e| format!("Couldn't memory map the file: {e}"))?;
            m.advise(Advice::Sequential).map_err(|e| format!("Failed to provide access advice to the OS, {e}"))?;
            Ok(TraceBytes::Mapped(m))
        }
    }
}
