use std::env;
use std::process;
use std::time::SystemTime;

use domain::adapters::memory_repo::InMemoryRepo;
use domain::codegen::RandomCodeGenerator;
use domain::service::ShortenerService;
use domain::{Clock, CoreError, NewShortUrl, ShortCode};

struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain create <url> [--code <custom>] [--minutes <n>]\n  domain resolve <code>\n\nNotes:\n  - This demo CLI uses an in-memory repository; data is not persisted across runs.",
        domain::about()
    );
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1); // skip program name

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    // Construct a demo service with in-memory storage
    let repo = InMemoryRepo::new();
    let generator = RandomCodeGenerator::default();
    let clock = StdClock;
    let svc = ShortenerService::new(repo, generator, clock, "https://sho.rt");

    match cmd.as_str() {
        "create" => {
            let Some(url) = args.next() else {
                return Err("missing <url> for create".into());
            };

            let mut custom_code: Option<String> = None;
            let mut validity_minutes: Option<u64> = None;

            // Parse simple flags: --code <val>, --minutes <n>
            let rest: Vec<String> = args.collect();
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--code" => {
                        if i + 1 >= rest.len() {
                            return Err("--code requires a value".into());
                        }
                        custom_code = Some(rest[i + 1].clone());
                        i += 2;
                    }
                    "--minutes" => {
                        if i + 1 >= rest.len() {
                            return Err("--minutes requires a number".into());
                        }
                        match rest[i + 1].parse::<u64>() {
                            Ok(n) => validity_minutes = Some(n),
                            Err(_) => return Err("invalid --minutes value".into()),
                        }
                        i += 2;
                    }
                    unk => {
                        return Err(format!("unknown argument: {}", unk));
                    }
                }
            }

            let input = NewShortUrl {
                original_url: url,
                custom_code,
                validity_minutes,
            };
            match svc.create(input) {
                Ok(link) => {
                    println!("created: {} -> {}", link.short_url, link.original_url);
                    Ok(())
                }
                Err(e) => Err(format!("create failed: {}", e)),
            }
        }
        "resolve" => {
            let Some(code_str) = args.next() else {
                return Err("missing <code> for resolve".into());
            };
            let code = match ShortCode::new(code_str) {
                Ok(c) => c,
                Err(e) => return Err(format!("invalid code: {}", e)),
            };
            match svc.resolve(&code) {
                Ok(url) => {
                    println!("{}", url);
                    Ok(())
                }
                Err(CoreError::NotFound) => Err("not found".into()),
                Err(e) => Err(format!("resolve failed: {}", e)),
            }
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
