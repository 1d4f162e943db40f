//! Custom `log::Log` implementation: level-gated, warn/error to stderr, info
//! to stdout, optional ANSI-stripped logfile mirroring. Library code never
//! configures a logger itself; only this binary does.

use std::fs;
use std::io::Write;
use std::sync::Mutex;

use log::LevelFilter;

pub(crate) struct CliLogger {
    level: LevelFilter,
    logfile: Option<Mutex<fs::File>>,
}

impl CliLogger {
    pub(crate) fn install(level: LevelFilter, logfile: Option<Mutex<fs::File>>) {
        let logger = Box::new(Self { level, logfile });
        log::set_boxed_logger(logger).expect("logger already installed");
        log::set_max_level(level);
    }
}

impl log::Log for CliLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = record.args().to_string();

        if record.level() <= log::Level::Warn {
            eprintln!("{msg}");
        } else {
            println!("{msg}");
        }

        if let Some(ref file) = self.logfile {
            let stripped = strip_ansi_escapes::strip(&msg);
            let text = String::from_utf8_lossy(&stripped);
            let mut guard = file.lock().unwrap();
            let _ = writeln!(guard, "{text}");
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.logfile {
            let _ = file.lock().unwrap().flush();
        }
    }
}
