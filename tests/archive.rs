mod common;

use std::io::Write;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use common::{filetime, utf16, weekly_recurrence_blob, BlockStore, Cell, NamedMapStreams, PcBuilder, TcBuilder};
use pst_reader::pst::messaging::message::{AttachMethod, RecipientType};
use pst_reader::pst::messaging::named::{lids, sets};
use pst_reader::pst::types::models::{BlockId, CryptMethod, SubNodeEntry};
use pst_reader::pst::types::properties::tags;
use pst_reader::{ByteRangeReader, Item, ItemKind, NodeId, OpenOptions, PstFile, PstVariant};

const NULL: BlockId = BlockId(0);
const HELLO_LZFU: &str = "2d0000002b0000004c5a4675f1c5c7a703000a007263706731323542320af32068656c090020627705b06c647d0a800fa0";

const ROOT: NodeId = NodeId(0x122);
const INBOX: NodeId = NodeId(0x8022);
const ARCHIVE: NodeId = NodeId(0x8042);
const NOTE: NodeId = NodeId(0x200024);
const BROKEN: NodeId = NodeId(0x200044);
const MEETING: NodeId = NodeId(0x200064);
const CONTACT: NodeId = NodeId(0x200084);

const FILE_ATTACHMENT: NodeId = NodeId(0x8025);
const EXCEPTION_ATTACHMENT: NodeId = NodeId(0x8045);
const EXCEPTION_MESSAGE: NodeId = NodeId(0x2000A4);

fn unicode_cell(text: &str) -> Cell {
    Cell::Heap(utf16(text))
}

fn folder_table(rows: &[(NodeId, &str)]) -> Vec<u8> {
    rows.iter()
        .fold(
            TcBuilder::new(&[(tags::DISPLAY_NAME, 0x001F), (tags::LTP_ROW_ID, 0x0003)]),
            |table, (id, name)| {
                table.row(
                    id.0,
                    vec![
                        (tags::DISPLAY_NAME, unicode_cell(name)),
                        (tags::LTP_ROW_ID, Cell::Inline(u64::from(id.0))),
                    ],
                )
            },
        )
        .build()
}

fn add_pc(store: &mut BlockStore, id: NodeId, parent: NodeId, heap: &[u8]) {
    let block = store.add_block(heap);
    store.add_node(id, block, NULL, parent);
}

fn sub_entry(id: NodeId, data: BlockId, sub_nodes: BlockId) -> SubNodeEntry {
    SubNodeEntry {
        id,
        data_block_id: data,
        sub_node_block_id: sub_nodes,
    }
}

/// A small archive:
///
/// ```text
/// root (0x122)            hierarchy table lists Inbox; contents table empty
/// └── Inbox (0x8022)      no hierarchy table; contents table lists three ids
///     │   note (0x200024)     recipients, one file attachment, RTF body
///     │   broken (0x200044)   not a heap
///     │   meeting (0x200064)  weekly recurrence with one embedded exception
///     └── Archive (0x8042)    no tables at all
///             contact (0x200084)
/// ```
fn build_archive(variant: PstVariant, crypt: CryptMethod) -> Vec<u8> {
    let mut store = BlockStore::new(variant).with_crypt(crypt);

    let store_pc = PcBuilder::new()
        .unicode(tags::DISPLAY_NAME, "Personal Folders")
        .binary(tags::RECORD_KEY, &[0x11; 16])
        .build();
    add_pc(&mut store, NodeId::MESSAGE_STORE, NodeId(0), &store_pc);

    let named = NamedMapStreams::new(&[sets::APPOINTMENT, sets::ADDRESS])
        .numeric(lids::APPOINTMENT_START, 0, 0)
        .numeric(lids::LOCATION, 0, 1)
        .numeric(lids::RECURRENCE_BLOB, 0, 2)
        .numeric(lids::EXCEPTION_REPLACE_TIME, 0, 3)
        .public_string("Keywords", 4)
        .numeric(lids::EMAIL1_ADDRESS, 1, 5);
    add_pc(&mut store, NodeId::NAME_TO_ID_MAP, NodeId(0), &named.to_property_context());

    let root_pc = PcBuilder::new()
        .unicode(tags::DISPLAY_NAME, "Top of Personal Folders")
        .boolean(tags::SUBFOLDERS, true)
        .build();
    add_pc(&mut store, ROOT, ROOT, &root_pc);
    add_pc(&mut store, ROOT.with_type(0x0D), ROOT, &folder_table(&[(INBOX, "Inbox")]));
    add_pc(&mut store, ROOT.with_type(0x0E), ROOT, &folder_table(&[]));

    let inbox_pc = PcBuilder::new()
        .unicode(tags::DISPLAY_NAME, "Inbox")
        .unicode(tags::CONTAINER_CLASS, "IPF.Note")
        .int32(tags::CONTENT_COUNT, 3)
        .int32(tags::CONTENT_UNREAD_COUNT, 1)
        .boolean(tags::SUBFOLDERS, true)
        .build();
    add_pc(&mut store, INBOX, ROOT, &inbox_pc);
    add_pc(
        &mut store,
        INBOX.with_type(0x0E),
        INBOX,
        &folder_table(&[(NOTE, "Status"), (BROKEN, "?"), (MEETING, "Weekly sync")]),
    );

    add_note(&mut store);
    let broken = store.add_block(b"this is not a heap");
    store.add_node(BROKEN, broken, NULL, INBOX);
    add_meeting(&mut store);

    let archive_pc = PcBuilder::new().unicode(tags::DISPLAY_NAME, "Archive").build();
    add_pc(&mut store, ARCHIVE, INBOX, &archive_pc);
    let contact_pc = PcBuilder::new()
        .unicode(tags::MESSAGE_CLASS, "IPM.Contact")
        .unicode(tags::DISPLAY_NAME, "Ada Lovelace")
        .unicode(tags::GIVEN_NAME, "Ada")
        .unicode(tags::SURNAME, "Lovelace")
        .unicode(0x8005, "ada@example.com")
        .build();
    add_pc(&mut store, CONTACT, ARCHIVE, &contact_pc);

    store.into_archive()
}

fn add_note(store: &mut BlockStore) {
    let recipients = TcBuilder::new(&[
        (tags::DISPLAY_NAME, 0x001F),
        (tags::EMAIL_ADDRESS, 0x001F),
        (tags::SMTP_ADDRESS, 0x001F),
        (tags::RECIPIENT_TYPE, 0x0003),
    ])
    .row(
        1,
        vec![
            (tags::DISPLAY_NAME, unicode_cell("Bob")),
            (tags::EMAIL_ADDRESS, unicode_cell("bob@example.com")),
            (tags::SMTP_ADDRESS, unicode_cell("bob@example.com")),
            (tags::RECIPIENT_TYPE, Cell::Inline(1)),
        ],
    )
    .row(
        2,
        vec![
            (tags::DISPLAY_NAME, unicode_cell("Carol")),
            (tags::RECIPIENT_TYPE, Cell::Inline(2)),
        ],
    )
    .build();
    let attachments = TcBuilder::new(&[(tags::ATTACH_METHOD, 0x0003), (tags::LTP_ROW_ID, 0x0003)])
        .row(
            FILE_ATTACHMENT.0,
            vec![
                (tags::ATTACH_METHOD, Cell::Inline(1)),
                (tags::LTP_ROW_ID, Cell::Inline(u64::from(FILE_ATTACHMENT.0))),
            ],
        )
        .build();
    let attachment = PcBuilder::new()
        .int32(tags::ATTACH_METHOD, 1)
        .unicode(tags::ATTACH_FILENAME, "REPORT.TXT")
        .unicode(tags::ATTACH_LONG_FILENAME, "report.txt")
        .binary(tags::ATTACH_DATA, b"file contents")
        .build();

    let recipients_block = store.add_block(&recipients);
    let attachments_block = store.add_block(&attachments);
    let attachment_block = store.add_block(&attachment);
    let sub_nodes = store.add_sub_node_leaf(&[
        sub_entry(NodeId::ATTACHMENT_TABLE, attachments_block, NULL),
        sub_entry(NodeId::RECIPIENT_TABLE, recipients_block, NULL),
        sub_entry(FILE_ATTACHMENT, attachment_block, NULL),
    ]);

    let note = PcBuilder::new()
        .unicode(tags::MESSAGE_CLASS, "IPM.Note")
        .unicode(tags::SUBJECT, "\u{1}\u{4}RE: Status")
        .unicode(tags::SENDER_NAME, "Alice")
        .unicode(tags::BODY, "hello world")
        .int32(tags::IMPORTANCE, 2)
        .int32(tags::MESSAGE_FLAGS, 0x11)
        .time(tags::CLIENT_SUBMIT_TIME, filetime(2024, 2, 1, 8, 30))
        .binary(tags::RTF_COMPRESSED, &hex::decode(HELLO_LZFU).unwrap())
        .build();
    let data = store.add_block(&note);
    store.add_node(NOTE, data, sub_nodes, INBOX);
}

fn add_meeting(store: &mut BlockStore) {
    let exception = PcBuilder::new()
        .unicode(tags::MESSAGE_CLASS, "IPM.OLE.CLASS.{00061055-0000-0000-C000-000000000046}")
        .unicode(tags::SUBJECT, "Moved")
        .unicode(0x8001, "Room 2")
        .time(0x8003, filetime(2024, 1, 8, 9, 0))
        .build();
    let exception_block = store.add_block(&exception);
    let attachment_sub_nodes = store.add_sub_node_leaf(&[sub_entry(EXCEPTION_MESSAGE, exception_block, NULL)]);

    let mut object = EXCEPTION_MESSAGE.0.to_le_bytes().to_vec();
    object.extend_from_slice(&(exception.len() as u32).to_le_bytes());
    let attachment = PcBuilder::new()
        .int32(tags::ATTACH_METHOD, 5)
        .unicode(tags::DISPLAY_NAME, "Moved")
        .heap_value(tags::ATTACH_DATA, 0x000D, &object)
        .build();
    let attachments = TcBuilder::new(&[(tags::ATTACH_METHOD, 0x0003)])
        .row(EXCEPTION_ATTACHMENT.0, vec![(tags::ATTACH_METHOD, Cell::Inline(5))])
        .build();

    let attachment_block = store.add_block(&attachment);
    let attachments_block = store.add_block(&attachments);
    let sub_nodes = store.add_sub_node_leaf(&[
        sub_entry(NodeId::ATTACHMENT_TABLE, attachments_block, NULL),
        sub_entry(EXCEPTION_ATTACHMENT, attachment_block, attachment_sub_nodes),
    ]);

    let meeting = PcBuilder::new()
        .unicode(tags::MESSAGE_CLASS, "IPM.Appointment")
        .unicode(tags::SUBJECT, "Weekly sync")
        .time(0x8000, filetime(2024, 1, 1, 9, 0))
        .unicode(0x8001, "Room 1")
        .binary(0x8002, &weekly_recurrence_blob())
        .build();
    let data = store.add_block(&meeting);
    store.add_node(MEETING, data, sub_nodes, INBOX);
}

fn open(bytes: Vec<u8>) -> PstFile {
    let source: Arc<dyn ByteRangeReader> = Arc::new(bytes);
    PstFile::from_reader(source, OpenOptions::default()).unwrap()
}

fn unicode_archive() -> PstFile {
    open(build_archive(PstVariant::Unicode, CryptMethod::None))
}

#[test]
fn message_store_and_named_map_are_read_at_open() {
    let pst = unicode_archive();
    assert_eq!(pst.header().variant, PstVariant::Unicode);

    let store = pst.message_store().unwrap();
    assert_eq!(
        store.string(tags::DISPLAY_NAME).unwrap().as_deref(),
        Some("Personal Folders")
    );
    assert_eq!(store.binary(tags::RECORD_KEY).unwrap(), Some(vec![0x11; 16]));

    let named = pst.named_properties();
    assert_eq!(named.len(), 6);
    assert_eq!(named.lookup(sets::APPOINTMENT, lids::LOCATION), Some(0x8001));
    assert_eq!(named.lookup(sets::ADDRESS, lids::EMAIL1_ADDRESS), Some(0x8005));
    assert_eq!(named.lookup_name(sets::PS_PUBLIC_STRINGS, "Keywords"), Some(0x8004));
}

#[test]
fn folder_walk_is_depth_first_from_the_root() {
    let pst = unicode_archive();
    let names: Vec<String> = pst
        .folders()
        .map(|folder| folder.unwrap().display_name().unwrap().unwrap_or_default())
        .collect();
    assert_eq!(names, ["Top of Personal Folders", "Inbox", "Archive"]);

    let inbox = pst.folder(INBOX).unwrap();
    assert_eq!(inbox.container_class().unwrap().as_deref(), Some("IPF.Note"));
    assert_eq!(inbox.content_count(), Some(3));
    assert_eq!(inbox.unread_count(), Some(1));
    assert!(inbox.has_subfolders());
    assert_eq!(inbox.sub_folder_ids().unwrap(), vec![ARCHIVE]);

    let from_inbox: Vec<NodeId> = pst
        .folders_from(INBOX)
        .map(|folder| folder.unwrap().id())
        .collect();
    assert_eq!(from_inbox, vec![INBOX, ARCHIVE]);
}

#[test]
fn folder_items_come_from_contents_table_or_parent_links() {
    let pst = unicode_archive();

    let root = pst.root_folder().unwrap();
    assert!(root.item_ids().unwrap().is_empty());

    let inbox = pst.folder(INBOX).unwrap();
    assert_eq!(inbox.item_ids().unwrap(), vec![NOTE, BROKEN, MEETING]);

    let archive = pst.folder(ARCHIVE).unwrap();
    assert!(archive.sub_folder_ids().unwrap().is_empty());
    assert_eq!(archive.item_ids().unwrap(), vec![CONTACT]);
}

#[test]
fn item_iteration_skips_undecodable_items() {
    let pst = unicode_archive();
    let inbox = pst.folder(INBOX).unwrap();
    let iter = pst.items(&inbox).unwrap();
    assert_eq!(iter.remaining(), 3);

    let items: Vec<Item> = iter.map(Result::unwrap).collect();
    let ids: Vec<NodeId> = items.iter().map(|item| item.message().id()).collect();
    assert_eq!(ids, vec![NOTE, MEETING]);
    assert_eq!(items[0].kind(), ItemKind::Message);
    assert_eq!(items[1].kind(), ItemKind::Appointment);

    assert!(pst.message(BROKEN).is_err());
}

#[test]
fn message_exposes_headers_recipients_and_body() {
    let pst = unicode_archive();
    let message = pst.message(NOTE).unwrap();

    assert_eq!(message.message_class().unwrap().as_deref(), Some("IPM.Note"));
    assert_eq!(message.subject().unwrap().as_deref(), Some("RE: Status"));
    assert_eq!(message.sender_name().unwrap().as_deref(), Some("Alice"));
    assert_eq!(message.importance(), Some(2));
    assert_eq!(message.flags(), Some(0x11));
    assert_eq!(
        message.client_submit_time().unwrap(),
        Some(Utc.with_ymd_and_hms(2024, 2, 1, 8, 30, 0).unwrap())
    );
    assert_eq!(message.body().unwrap().as_deref(), Some("hello world"));
    assert_eq!(
        message.body_rtf().unwrap().as_deref(),
        Some("{\\rtf1\\ansi\\ansicpg1252\\pard hello world}\r\n")
    );
    assert_eq!(message.body_html().unwrap(), None);

    let recipients = message.recipients().unwrap();
    assert_eq!(recipients.len(), 2);
    assert_eq!(recipients[0].display_name().unwrap().as_deref(), Some("Bob"));
    assert_eq!(
        recipients[0].smtp_address().unwrap().as_deref(),
        Some("bob@example.com")
    );
    assert_eq!(recipients[0].recipient_type(), Some(RecipientType::To));
    assert_eq!(recipients[1].display_name().unwrap().as_deref(), Some("Carol"));
    assert_eq!(recipients[1].email_address().unwrap(), None);
    assert_eq!(recipients[1].recipient_type(), Some(RecipientType::Cc));
}

#[test]
fn file_attachment_is_opened_from_the_sub_node_tree() {
    let pst = unicode_archive();
    let message = pst.message(NOTE).unwrap();
    assert_eq!(message.attachment_ids().unwrap(), vec![FILE_ATTACHMENT]);

    let attachments = message.attachments().unwrap();
    assert_eq!(attachments.len(), 1);
    let attachment = &attachments[0];
    assert_eq!(attachment.id(), FILE_ATTACHMENT);
    assert_eq!(attachment.method(), AttachMethod::ByValue);
    assert_eq!(attachment.filename().unwrap().as_deref(), Some("report.txt"));
    assert_eq!(attachment.data().unwrap(), Some(b"file contents".to_vec()));
    assert!(attachment.embedded_message().unwrap().is_none());
}

#[test]
fn message_without_sub_tables_has_no_recipients_or_attachments() {
    let pst = unicode_archive();
    let contact = pst.message(CONTACT).unwrap();
    assert!(contact.recipients().unwrap().is_empty());
    assert!(contact.attachment_ids().unwrap().is_empty());
}

#[test]
fn appointment_reads_named_properties_and_exceptions() {
    let pst = unicode_archive();
    let Item::Appointment(appointment) = pst.item(MEETING).unwrap() else {
        panic!("expected an appointment");
    };

    assert_eq!(
        appointment.start_time().unwrap(),
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
    );
    assert_eq!(appointment.end_time().unwrap(), None);
    assert_eq!(appointment.location().unwrap().as_deref(), Some("Room 1"));
    assert!(!appointment.is_all_day());
    assert!(appointment.time_zone().unwrap().is_none());

    let pattern = appointment.recurrence().unwrap().unwrap();
    assert_eq!(pattern.occurrence_count, 10);
    assert_eq!(pattern.exceptions.len(), 1);
    assert_eq!(pattern.exceptions[0].subject.as_deref(), Some("Moved"));

    let attachment = &appointment.message().attachments().unwrap()[0];
    assert_eq!(attachment.method(), AttachMethod::EmbeddedMessage);
    assert_eq!(attachment.data().unwrap(), None);

    let exceptions = appointment.exceptions().unwrap();
    assert_eq!(exceptions.len(), 1);
    let (index, embedded) = &exceptions[0];
    assert_eq!(*index, 0);
    assert_eq!(embedded.id(), EXCEPTION_MESSAGE);
    assert_eq!(embedded.subject().unwrap().as_deref(), Some("Moved"));
    assert_eq!(
        embedded
            .named_string(sets::APPOINTMENT, lids::LOCATION)
            .unwrap()
            .as_deref(),
        Some("Room 2")
    );
}

#[test]
fn contact_view_resolves_named_address_properties() {
    let pst = unicode_archive();
    let Item::Contact(contact) = pst.item(CONTACT).unwrap() else {
        panic!("expected a contact");
    };
    assert_eq!(contact.display_name().unwrap().as_deref(), Some("Ada Lovelace"));
    assert_eq!(contact.given_name().unwrap().as_deref(), Some("Ada"));
    assert_eq!(contact.surname().unwrap().as_deref(), Some("Lovelace"));
    assert_eq!(contact.email(1).unwrap().as_deref(), Some("ada@example.com"));
    assert_eq!(contact.email(2).unwrap(), None);
    assert_eq!(contact.email(4).unwrap(), None);
}

#[test]
fn walk_descriptors_visits_every_node() {
    let pst = unicode_archive();
    let mut ids = Vec::new();
    pst.walk_descriptors(&mut |entry| ids.push(entry.id)).unwrap();
    assert_eq!(ids.len(), 12);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(ids.contains(&NodeId::NAME_TO_ID_MAP));
}

#[test]
fn encrypted_ansi_archive_opens_from_disk() {
    let bytes = build_archive(PstVariant::Ansi, CryptMethod::Permute);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let pst = PstFile::open(file.path()).unwrap();
    assert_eq!(pst.header().variant, PstVariant::Ansi);
    assert_eq!(pst.header().crypt_method, CryptMethod::Permute);

    let names: Vec<String> = pst
        .folders()
        .map(|folder| folder.unwrap().display_name().unwrap().unwrap_or_default())
        .collect();
    assert_eq!(names, ["Top of Personal Folders", "Inbox", "Archive"]);

    let inbox = pst.folder(INBOX).unwrap();
    let subjects: Vec<String> = pst
        .items(&inbox)
        .unwrap()
        .map(|item| item.unwrap().message().subject().unwrap().unwrap_or_default())
        .collect();
    assert_eq!(subjects, ["RE: Status", "Weekly sync"]);

    let attachment = &pst.message(NOTE).unwrap().attachments().unwrap()[0];
    assert_eq!(attachment.data().unwrap(), Some(b"file contents".to_vec()));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = PstFile::open(dir.path().join("absent.pst"));
    assert!(matches!(result, Err(pst_reader::PstError::Io(_))));
}
