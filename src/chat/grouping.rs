//! Turning the flat message list into what a message list displays: a date
//! separator before each calendar day and a flag on messages that continue a
//! run from the same author.

use chrono::{DateTime, Local, NaiveDate, TimeZone};

use super::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayItem<'a> {
    DateSeparator { label: String },
    Message { message: &'a Message, is_grouped: bool },
}

impl DisplayItem<'_> {
    pub fn is_grouped(&self) -> bool {
        matches!(self, Self::Message { is_grouped: true, .. })
    }
}

pub const TODAY: &str = "Today";
pub const YESTERDAY: &str = "Yesterday";
const INVALID_DATE: &str = "Invalid Date";

/// Label for a calendar day relative to `today`, e.g. `Wed Oct 14 2026`.
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        TODAY.to_string()
    } else if today.pred_opt() == Some(day) {
        YESTERDAY.to_string()
    } else {
        day.format("%a %b %d %Y").to_string()
    }
}

/// Groups `messages` (expected in display order) against the calendar of
/// `now`'s time zone.
pub fn group_messages<'a, Tz: TimeZone>(
    messages: &'a [Message],
    now: &DateTime<Tz>,
) -> Vec<DisplayItem<'a>> {
    let zone = now.timezone();
    let today = now.date_naive();

    let mut out = Vec::with_capacity(messages.len() + 1);
    let mut current_day: Option<Option<NaiveDate>> = None;
    let mut last_author: Option<&str> = None;

    for message in messages {
        let day = zone
            .timestamp_millis_opt(message.sent_at)
            .earliest()
            .map(|dt| dt.date_naive());

        if current_day != Some(day) {
            let label = day.map_or_else(|| INVALID_DATE.to_string(), |d| day_label(d, today));
            out.push(DisplayItem::DateSeparator { label });
            current_day = Some(day);
            last_author = None;
        }

        let is_grouped = last_author == Some(message.author_uuid.as_str());
        out.push(DisplayItem::Message {
            message,
            is_grouped,
        });
        last_author = Some(&message.author_uuid);
    }

    out
}

pub fn group_messages_local(messages: &[Message]) -> Vec<DisplayItem<'_>> {
    group_messages(messages, &Local::now())
}
