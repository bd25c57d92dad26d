//! Helpers for writing CPU description fixtures.

use std::io::Write;
use tempfile::NamedTempFile;

/// Excerpt of an x86 `/proc/cpuinfo` with the given `cpu MHz` value.
pub fn x86_cpuinfo(mhz: &str) -> String {
    format!(
        "processor\t: 0\n\
         vendor_id\t: AuthenticAMD\n\
         cpu family\t: 23\n\
         model\t\t: 113\n\
         model name\t: AMD Ryzen 5 3600 6-Core Processor\n\
         stepping\t: 0\n\
         cpu MHz\t\t: {mhz}\n\
         cache size\t: 512 KB\n\
         physical id\t: 0\n"
    )
}

/// Excerpt of an ARM `/proc/cpuinfo`, which has no `cpu MHz` record.
pub const ARM_CPUINFO: &str = "processor\t: 0\n\
    BogoMIPS\t: 108.00\n\
    Features\t: fp asimd evtstrm crc32 cpuid\n\
    CPU implementer\t: 0x41\n\
    CPU architecture: 8\n";

/// Write `contents` to a fresh temporary file.
pub fn write_cpuinfo(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp cpuinfo");
    file.write_all(contents.as_bytes()).expect("write temp cpuinfo");
    file.flush().expect("flush temp cpuinfo");
    file
}
