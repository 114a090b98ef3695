use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process;

fn socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join("portal-bar.sock")
}

fn is_known(cmd: &str) -> bool {
    match cmd {
        "status" | "apps" | "back" | "home" | "recents" | "collapse" | "expand" | "quit" => true,
        _ => cmd
            .strip_prefix("launch ")
            .is_some_and(|pkg| !pkg.trim().is_empty()),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
        process::exit(1);
    }

    let cmd = args.join(" ");
    if !is_known(&cmd) {
        eprintln!("unknown command: {cmd}");
        usage();
        process::exit(1);
    }

    let path = socket_path();
    let mut stream = match UnixStream::connect(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("portal-bar not running ({path:?}): {e}");
            process::exit(1);
        }
    };

    if let Err(e) = writeln!(stream, "{cmd}") {
        eprintln!("failed to send command: {e}");
        process::exit(1);
    }
    let _ = stream.shutdown(Shutdown::Write);

    // The daemon closes the connection once it has answered.
    let mut reply = String::new();
    if let Err(e) = stream.read_to_string(&mut reply) {
        eprintln!("failed to read reply: {e}");
        process::exit(1);
    }
    let reply = reply.trim_end();
    if !reply.is_empty() {
        println!("{reply}");
    }
}

fn usage() {
    eprintln!("usage: portal-bar-ctl <command>");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  status          print display and overlay state as JSON");
    eprintln!("  apps            print launchable apps as JSON");
    eprintln!("  launch <pkg>    launch an app on the external display");
    eprintln!("  back            inject the back key");
    eprintln!("  home            inject the home key");
    eprintln!("  recents         inject the recents key");
    eprintln!("  collapse        fold the bar into its corner buttons");
    eprintln!("  expand          restore the full bar");
    eprintln!("  quit            remove the overlay and exit");
}
