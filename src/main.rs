fn main() {
    if let Err(e) = med_reminders_lib::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
