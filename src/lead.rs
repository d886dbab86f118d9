use std::io::Write;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::contact::PhoneKind;

/// One emitted lead. Moved into the sink; nothing keeps it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadRecord {
    pub name: String,
    pub raw_phone: Option<String>,
    pub cleaned_phone: String,
    pub kind: PhoneKind,
    pub messaging_link: String,
    pub rank: u32,
    pub source_query: String,
}

/// Receives records one at a time, in emission order.
pub trait LeadSink {
    fn emit(&mut self, record: LeadRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: LeadSink + ?Sized> LeadSink for &mut S {
    fn emit(&mut self, record: LeadRecord) -> Result<()> {
        (**self).emit(record)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Newline-delimited JSON, one record per line.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        JsonLinesSink { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LeadSink for JsonLinesSink<W> {
    fn emit(&mut self, record: LeadRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Sends every record to each inner sink, in order.
pub struct FanOut<'a> {
    sinks: Vec<Box<dyn LeadSink + 'a>>,
}

impl<'a> FanOut<'a> {
    pub fn new(sinks: Vec<Box<dyn LeadSink + 'a>>) -> Self {
        FanOut { sinks }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LeadSink for FanOut<'_> {
    fn emit(&mut self, record: LeadRecord) -> Result<()> {
        if let Some((last, rest)) = self.sinks.split_last_mut() {
            for sink in rest {
                sink.emit(record.clone())?;
            }
            last.emit(record)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Usage accounting hook, told about each WhatsApp-reachable lead.
pub trait UsageMeter {
    fn whatsapp_lead(&mut self, record: &LeadRecord);
}

/// Counts billable events for the run summary.
#[derive(Debug, Default)]
pub struct EventCounter {
    pub whatsapp: u32,
}

impl UsageMeter for EventCounter {
    fn whatsapp_lead(&mut self, record: &LeadRecord) {
        self.whatsapp += 1;
        debug!("Metered WhatsApp lead #{} ({})", record.rank, record.name);
    }
}
