//! Example demonstrating the #[derive(Inject)] macro
//!
//! Run with:
//!   cargo run --example derive --features derive

use service_injector::prelude::*;

struct Database {
    url: String,
}

struct Cache {
    size: usize,
}

struct Logger;

#[derive(Inject)]
struct UserService {
    #[inject]
    db: Arc<Database>,
    #[inject]
    cache: Arc<Cache>,
    #[inject(optional)]
    logger: Option<Arc<Logger>>,
    // Non-injected field uses Default
    request_count: u64,
}

impl UserService {
    fn describe(&self) -> String {
        let logger_status = if self.logger.is_some() {
            "with logging"
        } else {
            "without logging"
        };
        format!(
            "UserService connected to {} with cache size {} ({}, requests: {})",
            self.db.url, self.cache.size, logger_status, self.request_count
        )
    }
}

// Looked up by field name first: "primary" wins over the unnamed fallback
#[derive(Inject)]
#[inject(name = "api", priority = -1)]
struct ApiController {
    #[inject]
    users: Arc<UserService>,
    #[inject(name = "primary")]
    db: Arc<Database>,
}

fn main() -> Result<()> {
    println!("=== Service Injector Derive Macro Demo ===\n");

    let services = ServicesBuilder::new()
        .declare::<ApiController>()
        .constructed()
        .register()
        .declare::<UserService>()
        .constructed()
        .register()
        .declare::<Database>()
        .named("primary")
        .with_instance(Database {
            url: "postgres://primary:5432/myapp".into(),
        })
        .register()
        .declare::<Database>()
        .named("replica")
        .priority(10)
        .with_instance(Database {
            url: "postgres://replica:5432/myapp".into(),
        })
        .register()
        .declare::<Cache>()
        .with_instance(Cache { size: 1024 })
        .register()
        // Logger is not declared, so it will be None
        .build()?;

    let api = services.get_named::<ApiController>("api")?;
    println!("  {}", api.users.describe());
    println!("  ApiController uses {}", api.db.url);

    println!("\n=== Demo Complete ===");
    println!("\n#[derive(Inject)] generated a Constructible impl that:");
    println!("  - Declares #[inject] fields as required dependencies");
    println!("  - Declares #[inject(optional)] fields as optional dependencies");
    println!("  - Uses Default::default() for non-injected fields");
    Ok(())
}
