//! Typed views over messages, selected once from the message class.

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::pst::types::error::Result;
use crate::pst::types::kinds::ItemKind;
use crate::pst::types::properties::tags;

use super::distlist::DistListEntry;
use super::message::{AttachMethod, Message};
use super::named::{lids, sets};
use super::recurrence::RecurrencePattern;
use super::timezone::TimeZoneRule;

/// A message node, classified.
#[derive(Debug)]
pub enum Item {
    Message(Message),
    Appointment(Appointment),
    Contact(Contact),
    Task(Task),
    DistList(DistList),
}

impl Item {
    /// Wraps `message` in the view its kind selects. Journal entries, notes and
    /// posts stay plain messages.
    pub fn from_message(message: Message) -> Self {
        match message.kind() {
            ItemKind::Appointment | ItemKind::MeetingRequest => {
                Item::Appointment(Appointment { message })
            }
            ItemKind::Contact => Item::Contact(Contact { message }),
            ItemKind::Task => Item::Task(Task { message }),
            ItemKind::DistList => Item::DistList(DistList { message }),
            ItemKind::Message | ItemKind::Journal | ItemKind::StickyNote | ItemKind::Post => {
                Item::Message(message)
            }
        }
    }

    /// The underlying message, whatever the view.
    pub fn message(&self) -> &Message {
        match self {
            Item::Message(message) => message,
            Item::Appointment(item) => &item.message,
            Item::Contact(item) => &item.message,
            Item::Task(item) => &item.message,
            Item::DistList(item) => &item.message,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.message().kind()
    }
}

/// Calendar item or meeting request.
#[derive(Debug)]
pub struct Appointment {
    message: Message,
}

impl Appointment {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn start_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.message.named_date(sets::APPOINTMENT, lids::APPOINTMENT_START)
    }

    pub fn end_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.message.named_date(sets::APPOINTMENT, lids::APPOINTMENT_END)
    }

    pub fn location(&self) -> Result<Option<String>> {
        self.message.named_string(sets::APPOINTMENT, lids::LOCATION)
    }

    pub fn is_all_day(&self) -> bool {
        self.message
            .named_bool(sets::APPOINTMENT, lids::ALL_DAY)
            .unwrap_or(false)
    }

    pub fn is_recurring(&self) -> bool {
        self.message
            .named_bool(sets::APPOINTMENT, lids::RECURRING)
            .unwrap_or(false)
    }

    /// 0 free, 1 tentative, 2 busy, 3 out of office.
    pub fn busy_status(&self) -> Option<i32> {
        self.message.named_int(sets::APPOINTMENT, lids::BUSY_STATUS)
    }

    /// The zone recurrences are expressed in: the recurring definition if
    /// present, otherwise the legacy struct named by its description.
    pub fn time_zone(&self) -> Result<Option<TimeZoneRule>> {
        let properties = self.message.properties();
        if let Some(id) = self
            .message
            .named_id(sets::APPOINTMENT, lids::TIME_ZONE_DEFINITION_RECUR)
        {
            if let Some(rule) = properties.timezone(id)? {
                return Ok(Some(rule));
            }
        }
        let Some(id) = self.message.named_id(sets::APPOINTMENT, lids::TIME_ZONE_STRUCT) else {
            return Ok(None);
        };
        let Some(rule) = properties.timezone(id)? else {
            return Ok(None);
        };
        Ok(Some(
            match self
                .message
                .named_string(sets::APPOINTMENT, lids::TIME_ZONE_DESCRIPTION)?
            {
                Some(name) if rule.name.is_none() && !name.is_empty() => rule.with_name(name),
                _ => rule,
            },
        ))
    }

    pub fn recurrence(&self) -> Result<Option<RecurrencePattern>> {
        let Some(blob) = self
            .message
            .named_binary(sets::APPOINTMENT, lids::RECURRENCE_BLOB)?
        else {
            return Ok(None);
        };
        if blob.is_empty() {
            return Ok(None);
        }
        RecurrencePattern::parse(&blob, self.time_zone()?).map(Some)
    }

    /// Embedded exception messages paired with the index of the recurrence
    /// exception they replace.
    ///
    /// Each embedded message is matched by the calendar day of its exception
    /// replace time. Unmatched or unreadable attachments are skipped.
    pub fn exceptions(&self) -> Result<Vec<(usize, Message)>> {
        let Some(pattern) = self.recurrence()? else {
            return Ok(Vec::new());
        };
        let mut matched = Vec::new();
        for attachment in self.message.attachments()? {
            if attachment.method() != AttachMethod::EmbeddedMessage {
                continue;
            }
            let embedded = match attachment.embedded_message() {
                Ok(Some(embedded)) => embedded,
                Ok(None) => continue,
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping exception attachment {}: {}", attachment.id(), e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let Some(replace_time) =
                embedded.named_date(sets::APPOINTMENT, lids::EXCEPTION_REPLACE_TIME)?
            else {
                continue;
            };
            match pattern.exception_for(&replace_time) {
                Some(index) => matched.push((index, embedded)),
                None => debug!("No exception on the day of {}", replace_time),
            }
        }
        Ok(matched)
    }
}

#[derive(Debug)]
pub struct Contact {
    message: Message,
}

impl Contact {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn display_name(&self) -> Result<Option<String>> {
        self.message.properties().string(tags::DISPLAY_NAME)
    }

    pub fn given_name(&self) -> Result<Option<String>> {
        self.message.properties().string(tags::GIVEN_NAME)
    }

    pub fn surname(&self) -> Result<Option<String>> {
        self.message.properties().string(tags::SURNAME)
    }

    pub fn company_name(&self) -> Result<Option<String>> {
        self.message.properties().string(tags::COMPANY_NAME)
    }

    pub fn title(&self) -> Result<Option<String>> {
        self.message.properties().string(tags::TITLE)
    }

    pub fn file_under(&self) -> Result<Option<String>> {
        self.message.named_string(sets::ADDRESS, lids::FILE_UNDER)
    }

    pub fn email1_display_name(&self) -> Result<Option<String>> {
        self.message.named_string(sets::ADDRESS, lids::EMAIL1_DISPLAY_NAME)
    }

    /// Email address 1, 2 or 3.
    pub fn email(&self, slot: u8) -> Result<Option<String>> {
        let lid = match slot {
            1 => lids::EMAIL1_ADDRESS,
            2 => lids::EMAIL2_ADDRESS,
            3 => lids::EMAIL3_ADDRESS,
            _ => return Ok(None),
        };
        self.message.named_string(sets::ADDRESS, lid)
    }

    pub fn business_phone(&self) -> Result<Option<String>> {
        self.message.properties().string(tags::BUSINESS_TELEPHONE)
    }

    pub fn home_phone(&self) -> Result<Option<String>> {
        self.message.properties().string(tags::HOME_TELEPHONE)
    }

    pub fn mobile_phone(&self) -> Result<Option<String>> {
        self.message.properties().string(tags::MOBILE_TELEPHONE)
    }
}

#[derive(Debug)]
pub struct Task {
    message: Message,
}

impl Task {
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// 0 not started, 1 in progress, 2 complete, 3 waiting, 4 deferred.
    pub fn status(&self) -> Option<i32> {
        self.message.named_int(sets::TASK, lids::TASK_STATUS)
    }

    /// Fraction complete, 0.0 to 1.0.
    pub fn percent_complete(&self) -> Result<Option<f64>> {
        self.message.named_double(sets::TASK, lids::TASK_PERCENT_COMPLETE)
    }

    pub fn is_complete(&self) -> bool {
        self.message
            .named_bool(sets::TASK, lids::TASK_COMPLETE)
            .unwrap_or(false)
    }

    pub fn start_date(&self) -> Result<Option<DateTime<Utc>>> {
        self.message.named_date(sets::TASK, lids::TASK_START)
    }

    pub fn due_date(&self) -> Result<Option<DateTime<Utc>>> {
        self.message.named_date(sets::TASK, lids::TASK_DUE)
    }
}

#[derive(Debug)]
pub struct DistList {
    message: Message,
}

impl DistList {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn display_name(&self) -> Result<Option<String>> {
        self.message.properties().string(tags::DISPLAY_NAME)
    }

    /// Members from the member list, or the one-off list when absent.
    /// Entries that fail to parse are logged and left out.
    pub fn members(&self) -> Result<Vec<DistListEntry>> {
        let raw = match self
            .message
            .named_multi_binary(sets::ADDRESS, lids::DIST_LIST_MEMBERS)?
        {
            Some(members) => members,
            None => self
                .message
                .named_multi_binary(sets::ADDRESS, lids::DIST_LIST_ONE_OFF_MEMBERS)?
                .unwrap_or_default(),
        };
        let mut members = Vec::with_capacity(raw.len());
        for entry in &raw {
            match DistListEntry::parse(entry) {
                Ok(member) => members.push(member),
                Err(e) => warn!(
                    "Skipping member of list {}: {}",
                    self.message.id(),
                    e
                ),
            }
        }
        Ok(members)
    }
}
