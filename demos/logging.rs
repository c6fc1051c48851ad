//! Example demonstrating logging capabilities
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-pretty,logging-json
//! ```

use service_injector::prelude::*;

struct Database {
    url: String,
}

struct Connection {
    url: String,
}

impl Closeable for Connection {
    fn close(&self) -> std::result::Result<(), BoxError> {
        println!("  [App] Closing connection to {}", self.url);
        Ok(())
    }
}

fn main() -> Result<()> {
    service_injector::logging::builder().trace().pretty().init();

    println!("=== Service Injector Logging Demo ===\n");

    // Logs: "Declaration registered", "Building registry", "Service added",
    // "Registry frozen"
    let root = ServicesBuilder::new()
        .with_name("root")
        .declare::<Connection>()
        .with_factory(
            ServiceDependencies::new().with(ServiceDependency::required::<Database>()),
            |deps| {
                let db = deps.required::<Database>(0)?;
                println!("  [App] Connecting to {}...", db.url);
                Ok(Connection { url: db.url.clone() })
            },
        )
        .closeable()
        .register()
        .declare::<Database>()
        .with_instance(Database {
            url: "postgres://localhost/mydb".into(),
        })
        .register()
        .build()?;

    // Logs: "Creating instance on first access", then "Returning cached instance"
    root.get::<Connection>()?;
    root.get::<Connection>()?;

    // Logs a not found lookup at trace level
    assert!(root.get::<i32>().is_err());

    // A child inherits the connection but never closes it
    let request = ServicesBuilder::new()
        .with_name("request")
        .with_parent(&root)
        .declare::<String>()
        .with_instance("req-12345".to_string())
        .register()
        .build()?;
    request.get::<Connection>()?;
    request.close();

    // Logs: "Closing registry", "Closing service"
    root.close();

    println!("\n=== Demo Complete ===");
    println!("Check the log output above to see structured logging in action!");
    Ok(())
}
