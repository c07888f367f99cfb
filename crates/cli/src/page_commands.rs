//! CLI subcommands that drive a live browser page.

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::{Result, bail},
    cartograph_browser::{LaunchedPage, PageSessions, launch_page},
    cartograph_config::CartographConfig,
    cartograph_containers::{
        BranchRequest, ContainerMatcher, ContainerService, LibraryCatalog, MatchOptions,
        MatchRequest,
    },
    cartograph_dom::{BranchFetcher, DomPath, FetchLimits},
    cartograph_events::EventBus,
    cartograph_rules::BindingRegistry,
    clap::Args,
    serde_json::json,
    tracing::info,
};

#[derive(Args)]
pub struct MatchArgs {
    /// Page to open.
    #[arg(long)]
    url: String,
    /// Library files; defaults to `libraries` from the config.
    #[arg(long = "library")]
    libraries: Vec<PathBuf>,
    #[arg(long)]
    max_depth: Option<usize>,
    #[arg(long)]
    max_children: Option<usize>,
    /// Skip the operations the library declares for discovered containers.
    #[arg(long, default_value_t = false)]
    no_operations: bool,
    /// Include the bus events raised while matching.
    #[arg(long, default_value_t = false)]
    events: bool,
}

#[derive(Args)]
pub struct BranchArgs {
    /// Page to open.
    #[arg(long)]
    url: String,
    /// Node to expand, e.g. `root/1/0`.
    #[arg(long, default_value = "root")]
    path: DomPath,
    #[arg(long)]
    depth: Option<usize>,
    #[arg(long)]
    children: Option<usize>,
}

/// Everything that serves requests against one launched page.
struct PageContext {
    service: ContainerService,
    sessions: Arc<PageSessions>,
    bus: Arc<EventBus>,
    session: String,
}

async fn page_context(
    config: &CartographConfig,
    catalog: LibraryCatalog,
    launched: &LaunchedPage,
) -> PageContext {
    let timeout = Duration::from_millis(config.browser.navigation_timeout_ms);
    let sessions = Arc::new(PageSessions::new(timeout));
    let session = sessions.insert(None, launched.page().clone()).await;
    let bus = Arc::new(EventBus::with_history_limit(config.bus.history_limit));

    let service = ContainerService::new(
        Arc::clone(&sessions) as _,
        Arc::new(catalog),
        ContainerMatcher::from_config(Arc::clone(&bus), &config.matcher),
        BranchFetcher::new(FetchLimits {
            depth_cap: config.fetch.depth_cap,
            children_cap: config.fetch.children_cap,
        }),
    )
    .with_defaults(MatchOptions::from(&config.matcher), MatchOptions {
        max_depth: config.fetch.max_depth,
        max_children: config.fetch.max_children,
    });

    PageContext {
        service,
        sessions,
        bus,
        session,
    }
}

/// Library files from the command line, else from the config.
fn library_files(config: &CartographConfig, args: &MatchArgs) -> Result<Vec<PathBuf>> {
    let files = if args.libraries.is_empty() {
        config.libraries.clone()
    } else {
        args.libraries.clone()
    };
    if files.is_empty() {
        bail!("no container library given; pass --library or set `libraries` in the config");
    }
    Ok(files)
}

pub async fn handle_match(config: &CartographConfig, args: &MatchArgs) -> Result<()> {
    let catalog = LibraryCatalog::load_files(&library_files(config, args)?)?;
    if catalog.for_url(&args.url).is_none() {
        bail!("no container library serves {}", args.url);
    }

    let launched = launch_page(&config.browser, &args.url).await?;
    let result = run_match(config, catalog, &launched, args).await;
    launched.close().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn run_match(
    config: &CartographConfig,
    catalog: LibraryCatalog,
    launched: &LaunchedPage,
    args: &MatchArgs,
) -> Result<serde_json::Value> {
    let ctx = page_context(config, catalog, launched).await;

    // Bindings must be registered before matching emits discovery events.
    let _registry = if args.no_operations {
        None
    } else {
        let executor = ctx.sessions.operations(&ctx.session).await?;
        let registry = BindingRegistry::new(Arc::clone(&ctx.bus), executor)?;
        if let Some(library) = ctx.service.catalog().for_url(&args.url) {
            let count = registry.register_library_operations(library)?;
            info!(library = library.name(), bindings = count, "library operations bound");
        }
        Some(registry)
    };

    let response = ctx
        .service
        .handle_match(MatchRequest {
            session: ctx.session.clone(),
            url: args.url.clone(),
            max_depth: args.max_depth,
            max_children: args.max_children,
        })
        .await?;

    let mut output = serde_json::to_value(&response)?;
    if args.events {
        output["events"] = json!(ctx.bus.history());
    }
    ctx.sessions.remove(&ctx.session).await;
    Ok(output)
}

pub async fn handle_branch(config: &CartographConfig, args: &BranchArgs) -> Result<()> {
    let launched = launch_page(&config.browser, &args.url).await?;
    let ctx = page_context(config, LibraryCatalog::new(), &launched).await;

    let result = ctx
        .service
        .handle_branch(BranchRequest {
            session: ctx.session.clone(),
            path: args.path.clone(),
            max_depth: args.depth,
            max_children: args.children,
        })
        .await;
    launched.close().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}
