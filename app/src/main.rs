//! clipcut - audio clip editor
//!
//! Command line entry point.

fn main() {
    if let Err(e) = clipcut_lib::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
