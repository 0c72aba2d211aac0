use pst_reader::pst::types::properties::tags;
use pst_reader::{Folder, Item, PstFile};
use std::env;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <path-to-pst-file> [--max-items <N>]", args[0]);
        std::process::exit(1);
    }

    let pst_path = &args[1];
    let mut max_items = 10usize;
    if let Some(idx) = args.iter().position(|arg| arg == "--max-items") {
        match args.get(idx + 1).map(|value| value.parse::<usize>()) {
            Some(Ok(value)) => max_items = value,
            Some(Err(_)) => {
                eprintln!("ERROR: --max-items expects a number.");
                std::process::exit(1);
            }
            None => {
                eprintln!("ERROR: --max-items flag requires an argument.");
                std::process::exit(1);
            }
        }
    }

    println!("Reading archive: {}", pst_path);
    println!("{}", "=".repeat(60));

    let pst = match PstFile::open(pst_path) {
        Ok(pst) => pst,
        Err(e) => {
            eprintln!("\nERROR: Failed to open archive");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let header = pst.header();
    println!("\nArchive Information:");
    println!("  Kind: {}", if header.is_ost { "OST" } else { "PST" });
    println!("  Layout: {} (wVer {})", header.variant, header.version);
    println!("  Encryption: {:?}", header.crypt_method);
    println!("  Named properties: {}", pst.named_properties().len());
    if let Ok(store) = pst.message_store() {
        if let Ok(Some(name)) = store.string(tags::DISPLAY_NAME) {
            println!("  Store: {}", name);
        }
        if let Ok(Some(key)) = store.binary(tags::RECORD_KEY) {
            println!("  Record key: {}", hex::encode(key));
        }
    }

    println!("\nFolders:");
    for folder in pst.folders() {
        match folder {
            Ok(folder) => print_folder(&pst, &folder, max_items),
            Err(e) => {
                eprintln!("\nERROR: Folder walk aborted");
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn print_folder(pst: &PstFile, folder: &Folder, max_items: usize) {
    let name = folder.display_name().ok().flatten().unwrap_or_default();
    println!(
        "\n  [{}] {} ({} items, {} unread)",
        folder.id(),
        name,
        folder.content_count().unwrap_or(0),
        folder.unread_count().unwrap_or(0)
    );

    let items = match pst.items(folder) {
        Ok(items) => items,
        Err(e) => {
            println!("    (items unreadable: {})", e);
            return;
        }
    };
    let total = items.remaining();
    for item in items.take(max_items) {
        match item {
            Ok(item) => println!("    {}", summarize(&item)),
            Err(e) => println!("    (error: {})", e),
        }
    }
    if total > max_items {
        println!("    ... and {} more", total - max_items);
    }
}

fn summarize(item: &Item) -> String {
    let message = item.message();
    let subject = message.subject().ok().flatten().unwrap_or_default();
    match item {
        Item::Appointment(appointment) => {
            let start = appointment
                .start_time()
                .ok()
                .flatten()
                .map(|time| time.to_rfc3339())
                .unwrap_or_default();
            format!("[appointment] {} @ {}", subject, start)
        }
        Item::Contact(contact) => format!(
            "[contact] {} <{}>",
            contact.display_name().ok().flatten().unwrap_or_default(),
            contact.email(1).ok().flatten().unwrap_or_default()
        ),
        Item::Task(task) => format!("[task] {} (status {:?})", subject, task.status()),
        Item::DistList(list) => format!(
            "[list] {} ({} members)",
            subject,
            list.members().map(|members| members.len()).unwrap_or(0)
        ),
        Item::Message(_) => {
            let sender = message.sender_name().ok().flatten().unwrap_or_default();
            let sent = message
                .client_submit_time()
                .ok()
                .flatten()
                .map(|time| time.to_rfc3339())
                .unwrap_or_default();
            format!("[{}] {} from {} {}", message.id(), subject, sender, sent)
        }
    }
}
