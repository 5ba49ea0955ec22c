use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

const STORAGE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DISPLAY_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;

    /// `YYYY-MM-DD HH:MM:SS`, the encoding written to the `date_created` column.
    fn storage_now(&self) -> anyhow::Result<String> {
        storage_format(self.now_utc())
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`
    fn display_now(&self) -> anyhow::Result<String> {
        display_format(self.now_utc())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

pub fn storage_format(at: OffsetDateTime) -> anyhow::Result<String> {
    Ok(at.to_offset(time::UtcOffset::UTC).format(STORAGE_FORMAT)?)
}

pub fn display_format(at: OffsetDateTime) -> anyhow::Result<String> {
    Ok(at.to_offset(time::UtcOffset::UTC).format(DISPLAY_FORMAT)?)
}

#[cfg(test)]
pub(crate) struct FixedClock(pub OffsetDateTime);

#[cfg(test)]
impl Clock for FixedClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.0
    }
}
