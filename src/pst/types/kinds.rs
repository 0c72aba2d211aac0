//! Item kind detection from the message class string.

/// The kind of record a message node holds.
///
/// Decided once per record from `PR_MESSAGE_CLASS`; every typed view is
/// selected from this value rather than re-inspecting properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Message,
    Appointment,
    MeetingRequest,
    Contact,
    DistList,
    Task,
    Journal,
    StickyNote,
    Post,
}

impl ItemKind {
    /// Classifies a message class. Matching is case-insensitive and prefix-based
    /// (`IPM.Appointment.Custom` is an appointment); unknown classes are plain
    /// messages.
    pub fn from_message_class(message_class: &str) -> Self {
        let class = message_class.to_ascii_lowercase();
        let prefixes: &[(&str, ItemKind)] = &[
            ("ipm.appointment", ItemKind::Appointment),
            ("ipm.schedule.meeting", ItemKind::MeetingRequest),
            ("ipm.contact", ItemKind::Contact),
            ("ipm.distlist", ItemKind::DistList),
            ("ipm.task", ItemKind::Task),
            ("ipm.activity", ItemKind::Journal),
            ("ipm.stickynote", ItemKind::StickyNote),
            ("ipm.post", ItemKind::Post),
        ];
        prefixes
            .iter()
            .find(|(prefix, _)| {
                class == *prefix
                    || (class.starts_with(prefix) && class.as_bytes().get(prefix.len()) == Some(&b'.'))
            })
            .map(|(_, kind)| *kind)
            .unwrap_or(ItemKind::Message)
    }

    /// Returns `true` for kinds carrying calendar properties.
    pub fn is_calendar(&self) -> bool {
        matches!(self, ItemKind::Appointment | ItemKind::MeetingRequest)
    }
}
