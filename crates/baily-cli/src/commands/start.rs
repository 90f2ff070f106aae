//! `baily start` command implementation.
//!
//! Boots the development environment for a single-page app:
//!
//! ```text
//! snapshot env (.env files + process env)
//!   → resolve paths (entry probing, public URL)
//!   → read manifest (homepage, proxy, browserslist)
//!   → resolve HTTPS (certificate/key self-check)
//!   → assemble bundler + dev server configs
//!   → choose port, prepare URLs
//!   → serve public/ with SPA fallback, proxy, and live reload
//! ```
//!
//! All resolution is synchronous and happens before the listener binds;
//! any failure prints its message to stdout and exits 1 without leaving
//! partial state running. The served `index.html` is interpolated
//! (`%PUBLIC_URL%` and friends) and gets the reload client injected; a
//! file watcher broadcasts reload messages over a WebSocket channel.

use std::collections::{BTreeMap, HashSet};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use baily_core::env::{ClientEnv, EnvironmentSnapshot};
use baily_core::manifest::installed_package_version;
use baily_core::paths::{app_directory, check_required_files};
use baily_core::server::SocketConfig;
use baily_core::urls::{choose_port, prepare_urls};
use baily_core::{
    resolve_https_config, BundlerConfig, ConfigError, DevServerConfig, DevUrls, HttpsConfig, Mode,
    PackageManifest, ProjectPaths, ProxyTarget,
};
use miette::{IntoDiagnostic, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

/// Largest request body the proxy will buffer before forwarding.
const MAX_PROXY_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Unregisters stale production service workers during development.
const NOOP_SERVICE_WORKER: &str = r"// Reset any previously registered service worker.
self.addEventListener('install', () => self.skipWaiting());
self.addEventListener('activate', () => {
  self.clients.matchAll({ type: 'window' }).then(windowClients => {
    for (const windowClient of windowClients) {
      windowClient.navigate(windowClient.url);
    }
  });
});
";

/// Dev server action.
#[derive(Debug, Clone)]
pub struct StartAction {
    /// Working directory (project root).
    pub cwd: PathBuf,
    /// Port to listen on; overrides the `PORT` environment variable.
    pub port: Option<u16>,
    /// Host to bind to; overrides the `HOST` environment variable.
    pub host: Option<String>,
    /// Mode for `.env` loading and the injected `NODE_ENV`.
    pub mode: String,
    /// Resolve and print the configuration without binding.
    pub dry_run: bool,
    /// Machine-readable output (dry run only).
    pub json: bool,
}

/// Shared server state.
struct ServerState {
    /// Broadcast channel for reload notifications.
    reload_tx: broadcast::Sender<ReloadMessage>,
    /// Resolved server configuration.
    config: DevServerConfig,
    /// Directory static assets are served from.
    public_dir: PathBuf,
    /// Interpolated HTML shell with the reload client injected.
    index_html: &'static str,
    /// Reload client script, generated once per session.
    reload_client: &'static str,
    /// Client used to forward proxy-eligible requests.
    http_client: reqwest::Client,
}

/// Messages pushed over the live-reload channel.
#[derive(Debug, Clone)]
enum ReloadMessage {
    /// Connected confirmation.
    Connected,
    /// Full page reload.
    Reload,
}

impl ReloadMessage {
    fn to_json(&self) -> String {
        match self {
            ReloadMessage::Connected => r#"{"type":"connected"}"#.to_string(),
            ReloadMessage::Reload => r#"{"type":"reload"}"#.to_string(),
        }
    }
}

/// Everything resolved before the server binds.
struct Prepared {
    mode: String,
    app_name: String,
    paths: ProjectPaths,
    client_env: ClientEnv,
    bundler: BundlerConfig,
    server: DevServerConfig,
    urls: DevUrls,
    use_yarn: bool,
    open: bool,
    watch_stdin: bool,
    interactive: bool,
}

/// Run the dev server.
pub async fn run(action: StartAction) -> Result<()> {
    let prepared = match bootstrap(&action) {
        Ok(prepared) => prepared,
        Err(err) => {
            println!("{err}");
            std::process::exit(1);
        }
    };

    if action.dry_run {
        return print_dry_run(&prepared, action.json);
    }

    serve(prepared).await
}

/// Resolve the full configuration. Synchronous; nothing is bound yet.
fn bootstrap(action: &StartAction) -> std::result::Result<Prepared, ConfigError> {
    let interactive = std::io::stdout().is_terminal();
    let say = |line: &str| {
        if !action.json {
            println!("{line}");
        }
    };

    let mode = action.mode.clone();
    let app_dir = app_directory(&action.cwd)?;
    let snapshot = EnvironmentSnapshot::capture(&app_dir, &mode).with_var("NODE_ENV", mode.clone());

    let manifest = PackageManifest::load(&app_dir.join("package.json"))?;
    let paths = ProjectPaths::resolve(&app_dir, &snapshot, manifest.homepage.as_deref());
    check_required_files(&[&paths.app_html, &paths.app_index])?;

    if !manifest.has_browserslist() && !app_dir.join(".browserslistrc").is_file() {
        say(&format!(
            "{} should define a browserslist section in package.json to control which browsers the build targets.",
            manifest.display_name()
        ));
        say("");
    }

    // The injected PUBLIC_URL never carries the trailing slash.
    let public_url = paths
        .public_url_or_path
        .strip_suffix('/')
        .unwrap_or(&paths.public_url_or_path)
        .to_string();
    let client_env = ClientEnv::harvest(&snapshot, &public_url);

    let https = resolve_https_config(&snapshot, &app_dir)?;
    let proxy = ProxyTarget::from_manifest(&manifest)?;

    let host = action
        .host
        .clone()
        .or_else(|| snapshot.get("HOST").map(str::to_string))
        .unwrap_or_else(|| "0.0.0.0".to_string());
    if action.host.is_none() {
        if let Some(env_host) = snapshot.get("HOST") {
            say(&format!(
                "Attempting to bind to HOST environment variable: {env_host}"
            ));
            say("If this was unintentional, check that you haven't mistakenly set it in your shell.");
            say("");
        }
    }

    let preferred_port = match action.port {
        Some(port) => port,
        None => snapshot.get("PORT").map(parse_port).transpose()?.unwrap_or(3000),
    };
    let port = choose_port(&host, preferred_port, interactive)?;
    if port != preferred_port {
        say(&format!(
            "Something is already running on port {preferred_port}. Using port {port} instead."
        ));
        say("");
    }

    let urls = prepare_urls(https.protocol(), &host, port, &paths.served_path());

    if client_env.fast_refresh() {
        if let Some(react) = installed_package_version(&app_dir, "react") {
            if (react.major, react.minor) < (16, 10) {
                say(&format!(
                    "Fast refresh requires React 16.10 or higher. You are using React {react}."
                ));
                say("");
            }
        }
    }

    let bundler = BundlerConfig::create(Mode::from_name(&mode), &paths, &client_env, &snapshot);
    let server = DevServerConfig::create(
        &paths,
        &snapshot,
        https,
        &host,
        port,
        proxy.as_ref(),
        urls.lan_host.as_deref(),
    );

    Ok(Prepared {
        mode,
        app_name: manifest.display_name().to_string(),
        use_yarn: paths.yarn_lock.is_file(),
        open: snapshot.get("BROWSER") != Some("none"),
        watch_stdin: !snapshot.is_true("CI"),
        interactive,
        paths,
        client_env,
        bundler,
        server,
        urls,
    })
}

/// Parse a `PORT` value. A typo fails the bootstrap loudly instead of
/// silently falling back to the default port.
fn parse_port(value: &str) -> std::result::Result<u16, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidPort {
        value: value.to_string(),
    })
}

#[derive(serde::Serialize)]
struct ResolvedConfig<'a> {
    mode: &'a str,
    paths: &'a ProjectPaths,
    bundler: &'a BundlerConfig,
    server: &'a DevServerConfig,
    urls: &'a DevUrls,
}

fn print_dry_run(prepared: &Prepared, json: bool) -> Result<()> {
    let resolved = ResolvedConfig {
        mode: &prepared.mode,
        paths: &prepared.paths,
        bundler: &prepared.bundler,
        server: &prepared.server,
        urls: &prepared.urls,
    };

    if json {
        println!("{}", serde_json::to_string(&resolved).into_diagnostic()?);
    } else {
        println!("baily start (dry run)");
        println!();
        println!("  mode:    {}", prepared.mode);
        println!("  entry:   {}", prepared.paths.app_index.display());
        println!("  static:  {}", prepared.paths.app_public.display());
        println!("  serve:   {}", prepared.urls.local_url);
        println!(
            "  proxy:   {}",
            prepared.server.proxy.as_deref().unwrap_or("none")
        );
        println!(
            "  https:   {}",
            if prepared.server.https.is_enabled() {
                "enabled"
            } else {
                "disabled"
            }
        );
    }

    Ok(())
}

/// Bind and serve until a shutdown signal arrives.
async fn serve(prepared: Prepared) -> Result<()> {
    let Prepared {
        app_name,
        paths,
        client_env,
        server: config,
        urls,
        use_yarn,
        open,
        watch_stdin,
        interactive,
        ..
    } = prepared;

    // Prepare the HTML shell once: interpolate %KEY% values and inject
    // the reload client.
    let raw_html = std::fs::read_to_string(&paths.app_html).into_diagnostic()?;
    let interpolated = interpolate_html(&raw_html, &client_env.interpolations());
    // Route paths come from the rooted mount; the public URL itself may
    // be a full URL outside development.
    let served = paths.served_path();
    let reload_src = format!("{served}__reload-client.js");
    let index_html: &'static str =
        Box::leak(inject_reload_client(&interpolated, &reload_src).into_boxed_str());
    let reload_client: &'static str =
        Box::leak(reload_client_script(&config.socket).into_boxed_str());

    let (reload_tx, _) = broadcast::channel::<ReloadMessage>(16);

    let http_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .into_diagnostic()?;

    let sock_path = config.socket.path.clone();
    let sw_route = format!("{served}service-worker.js");
    let host = config.host.clone();
    let port = config.port;
    let tls_material = match &config.https {
        HttpsConfig::Enabled { cert, key } => Some((cert.clone(), key.clone())),
        HttpsConfig::Disabled => None,
    };

    let state = Arc::new(ServerState {
        reload_tx: reload_tx.clone(),
        public_dir: config.static_serve.directory.clone(),
        index_html,
        reload_client,
        http_client,
        config,
    });

    // File watcher feeding the reload channel.
    let (file_change_tx, mut file_change_rx) = mpsc::channel::<Vec<String>>(16);
    let watch_dir = paths.app_dir.clone();
    let build_dir = paths.app_build.clone();
    std::thread::spawn(move || {
        if let Err(e) = watch_files(watch_dir, build_dir, file_change_tx) {
            eprintln!("  File watcher error: {e}");
        }
    });

    let change_state = state.clone();
    let app_dir_prefix = format!("{}/", paths.app_dir.display());
    tokio::spawn(async move {
        while let Some(changed) = file_change_rx.recv().await {
            for file in &changed {
                println!(
                    "  File changed: {}",
                    file.strip_prefix(&app_dir_prefix).unwrap_or(file)
                );
            }
            let _ = change_state.reload_tx.send(ReloadMessage::Reload);
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route(&sock_path, get(reload_websocket))
        .route(&reload_src, get(serve_reload_client))
        .route(&sw_route, get(serve_noop_service_worker))
        .fallback(handle_request)
        .layer(cors)
        .layer(CompressionLayer::new())
        .with_state(state.clone());

    let addr = tokio::net::lookup_host((host.as_str(), port))
        .await
        .into_diagnostic()?
        .next()
        .ok_or_else(|| miette::miette!("Could not resolve host: {host}"))?;

    // Bind before printing so a failed bind never claims success.
    let std_listener = std::net::TcpListener::bind(addr).into_diagnostic()?;
    std_listener.set_nonblocking(true).into_diagnostic()?;

    if interactive {
        clear_console();
    }
    println!("Starting the development server...");
    println!();
    print_instructions(&app_name, &urls, use_yarn);

    if open {
        let _ = open_browser(&urls.local_url);
    }

    if let Some((cert, key)) = tls_material {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let tls = RustlsConfig::from_pem(cert, key).await.into_diagnostic()?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal(watch_stdin).await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(2)));
        });

        axum_server::from_tcp_rustls(std_listener, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .into_diagnostic()?;
    } else {
        let listener = tokio::net::TcpListener::from_std(std_listener).into_diagnostic()?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(watch_stdin))
            .await
            .into_diagnostic()?;
    }

    // The watcher thread never joins; exit cleanly once serving stops.
    std::process::exit(0)
}

fn print_instructions(app_name: &str, urls: &DevUrls, use_yarn: bool) {
    println!("You can now view {app_name} in the browser.");
    println!();
    if let Some(lan_url) = &urls.lan_url {
        println!("  Local:            {}", urls.local_url);
        println!("  On Your Network:  {lan_url}");
    } else {
        println!("  {}", urls.local_url);
    }
    println!();
    println!("Note that the development build is not optimized.");
    println!(
        "To create a production build, use {}.",
        if use_yarn { "yarn build" } else { "npm run build" }
    );
    println!();
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Handle WebSocket connections for live reload.
async fn reload_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_reload_socket(socket, state))
}

async fn handle_reload_socket(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.reload_tx.subscribe();

    // Send connected message
    let _ = socket
        .send(Message::Text(ReloadMessage::Connected.to_json()))
        .await;

    loop {
        tokio::select! {
            // Server → Client: forward reload notifications
            Ok(msg) = rx.recv() => {
                if socket.send(Message::Text(msg.to_json())).await.is_err() {
                    break;
                }
            }
            // Client → Server: nothing to act on, messages are drained
            Some(Ok(_)) = socket.recv() => {}
            else => break,
        }
    }
}

/// Serve the reload client runtime.
async fn serve_reload_client(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/javascript")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(state.reload_client.to_string())
        .unwrap()
}

/// Serve the no-op service worker that clears stale production workers.
async fn serve_noop_service_worker() -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/javascript")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(NOOP_SERVICE_WORKER.to_string())
        .unwrap()
}

/// Fallback handler: host check, served-path redirect, static files,
/// proxy, and the SPA history fallback, in that order.
async fn handle_request(State(state): State<Arc<ServerState>>, req: Request) -> Response {
    let host_header = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !state.config.allowed_hosts.allows(host_header) {
        return text_response(StatusCode::FORBIDDEN, "Invalid Host header");
    }

    let path = req.uri().path().to_string();

    // Requests outside the served path are redirected onto it.
    let served = state.config.dev_middleware_public_path.clone();
    if !within_served_path(&path, &served) {
        return redirect_response(&format!("{served}{path}"));
    }

    let rel = path
        .strip_prefix(served.as_str())
        .unwrap_or(&path)
        .trim_start_matches('/')
        .to_string();

    let is_read = req.method() == Method::GET || req.method() == Method::HEAD;

    // The HTML shell is always served interpolated, never raw from disk.
    if is_read && (rel.is_empty() || rel == "index.html") {
        return html_response(state.index_html);
    }

    // Static files from public/.
    if is_read {
        if let Some(safe) = sanitize_rel_path(&rel) {
            let file = state.public_dir.join(safe);
            if file.is_file() {
                return serve_file(&file).await;
            }
        }
    }

    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let accepts_html = accept.contains("text/html");

    // Proxy-eligible requests go to the backend: everything that is not a
    // public file, does not want HTML, and is not the reload socket.
    if let Some(proxy_base) = state.config.proxy.clone() {
        if !accepts_html && !path.starts_with(&state.config.socket.path) {
            return forward_to_proxy(&state, &proxy_base, req).await;
        }
    }

    // SPA history fallback. The dot rule is disabled: paths with dots
    // fall back to the shell too.
    if is_read && (accepts_html || accept.contains("*/*")) {
        return html_response(state.index_html);
    }

    text_response(StatusCode::NOT_FOUND, format!("Not found: {path}"))
}

async fn serve_file(file: &Path) -> Response {
    let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");
    match tokio::fs::read(file).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type_for(ext))
            .body(Body::from(bytes))
            .unwrap(),
        Err(_) => text_response(StatusCode::NOT_FOUND, "Not found"),
    }
}

/// Forward a request to the proxy target, preserving method, path,
/// query, body, and content headers.
async fn forward_to_proxy(state: &ServerState, base: &str, req: Request) -> Response {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), ToString::to_string);
    let target = format!("{}{}", base.trim_end_matches('/'), path_and_query);

    let (parts, body) = req.into_parts();
    let Ok(body_bytes) = axum::body::to_bytes(body, MAX_PROXY_BODY_BYTES).await else {
        return text_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
    };

    let mut headers = parts.headers;
    for name in [
        header::HOST,
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(&name);
    }

    debug!(%target, method = %parts.method, "forwarding to proxy");

    let result = state
        .http_client
        .request(parts.method, &target)
        .headers(headers)
        .body(body_bytes)
        .send()
        .await;

    match result {
        Ok(upstream) => {
            let status = upstream.status();
            let mut response_headers = upstream.headers().clone();
            for name in [
                header::CONNECTION,
                header::TRANSFER_ENCODING,
                header::CONTENT_LENGTH,
            ] {
                response_headers.remove(&name);
            }

            let bytes = match upstream.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => return proxy_error_response(&target, &e),
            };

            let mut builder = Response::builder().status(status);
            if let Some(headers_mut) = builder.headers_mut() {
                *headers_mut = response_headers;
            }
            builder
                .body(Body::from(bytes))
                .unwrap_or_else(|_| text_response(StatusCode::BAD_GATEWAY, "Proxy error"))
        }
        Err(e) => proxy_error_response(&target, &e),
    }
}

fn proxy_error_response(target: &str, error: &dyn std::fmt::Display) -> Response {
    debug!(%target, %error, "proxy request failed");
    text_response(
        StatusCode::BAD_GATEWAY,
        format!("Proxy error: could not proxy request to {target} ({error})."),
    )
}

fn text_response(status: StatusCode, body: impl Into<String>) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body.into()))
        .unwrap()
}

fn html_response(html: &'static str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(html))
        .unwrap()
}

fn redirect_response(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .body(Body::empty())
        .unwrap()
}

// ============================================================================
// File Watching
// ============================================================================

/// Check if a path should be ignored by the file watcher.
fn should_ignore(path: &Path) -> bool {
    let path_str = path.to_string_lossy();

    if path_str.contains("/node_modules/")
        || path_str.contains("/.git/")
        || path_str.contains("/build/")
        || path_str.contains("/dist/")
        || path_str.contains("/coverage/")
    {
        return true;
    }

    if let Some(name) = path.file_name() {
        if name.to_string_lossy().starts_with('.') {
            return true;
        }
    }

    false
}

/// Changes arriving within this window coalesce into a single reload.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(50);

/// Watch source and markup files for changes.
fn watch_files(
    cwd: PathBuf,
    build_dir: PathBuf,
    file_change_tx: mpsc::Sender<Vec<String>>,
) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = RecommendedWatcher::new(tx, Config::default()).into_diagnostic()?;
    watcher
        .watch(&cwd, RecursiveMode::Recursive)
        .into_diagnostic()?;

    pump_watch_events(&rx, &build_dir, &file_change_tx);
    Ok(())
}

/// Drain watcher events, collecting relevant paths and flushing the
/// pending set once the stream has been quiet for [`WATCH_DEBOUNCE`]. A
/// burst of events becomes one reload; a lone save is never stranded
/// waiting for a follow-up event.
fn pump_watch_events(
    rx: &std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    build_dir: &Path,
    file_change_tx: &mpsc::Sender<Vec<String>>,
) {
    use std::sync::mpsc::RecvTimeoutError;

    let mut pending: HashSet<PathBuf> = HashSet::new();

    loop {
        match rx.recv_timeout(WATCH_DEBOUNCE) {
            Ok(Ok(event)) => {
                for path in event.paths {
                    if should_ignore(&path) || path.starts_with(build_dir) {
                        continue;
                    }
                    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                    if matches!(
                        ext,
                        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "css" | "json" | "html"
                    ) {
                        pending.insert(path);
                    }
                }
            }
            Ok(Err(e)) => {
                eprintln!("  Watch error: {e}");
            }
            Err(RecvTimeoutError::Timeout) => {
                if pending.is_empty() {
                    continue;
                }
                let changed: Vec<String> =
                    pending.drain().map(|p| p.display().to_string()).collect();
                if file_change_tx.blocking_send(changed).is_err() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

// ============================================================================
// Shutdown
// ============================================================================

/// Resolves when SIGINT/SIGTERM arrives, or when stdin reaches EOF
/// (unless disabled for CI).
async fn shutdown_signal(watch_stdin: bool) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let stdin_closed = async move {
        if watch_stdin {
            let (tx, rx) = tokio::sync::oneshot::channel::<()>();
            std::thread::spawn(move || {
                use std::io::Read;
                let mut stdin = std::io::stdin();
                let mut buf = [0u8; 256];
                loop {
                    match stdin.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                let _ = tx.send(());
            });
            let _ = rx.await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
        () = stdin_closed => {},
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Replace `%KEY%` placeholders in the HTML shell.
fn interpolate_html(html: &str, interpolations: &BTreeMap<String, String>) -> String {
    let mut result = html.to_string();
    for (key, value) in interpolations {
        result = result.replace(&format!("%{key}%"), value);
    }
    result
}

/// Inject the reload client script before `</head>` (or `</body>` as a
/// fallback).
fn inject_reload_client(html: &str, script_src: &str) -> String {
    if html.contains(script_src) {
        return html.to_string();
    }

    let tag = format!(r#"<script src="{script_src}"></script>"#);
    let mut html = html.to_string();
    if let Some(pos) = html.find("</head>") {
        html.insert_str(pos, &format!("  {tag}\n  "));
    } else if let Some(pos) = html.find("</body>") {
        html.insert_str(pos, &format!("  {tag}\n  "));
    } else {
        html.push_str(&format!("\n{tag}"));
    }
    html
}

/// Generate the reload client for this session's socket addressing.
fn reload_client_script(socket: &SocketConfig) -> String {
    let host_expr = socket.host.as_deref().map_or_else(
        || "window.location.hostname".to_string(),
        |h| serde_json::Value::String(h.to_string()).to_string(),
    );
    let port_expr = socket.port.as_deref().map_or_else(
        || "window.location.port".to_string(),
        |p| serde_json::Value::String(p.to_string()).to_string(),
    );
    let path_literal = serde_json::Value::String(socket.path.clone()).to_string();

    format!(
        r"// Injected by the dev server; reloads the page when files change.
(() => {{
  const host = {host_expr};
  const port = {port_expr};
  const path = {path_literal};
  const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
  const connect = () => {{
    const socket = new WebSocket(protocol + '//' + host + ':' + port + path);
    socket.onmessage = (event) => {{
      const message = JSON.parse(event.data);
      if (message.type === 'reload') {{
        window.location.reload();
      }}
    }};
    socket.onclose = () => {{
      setTimeout(connect, 1000);
    }};
  }};
  connect();
}})();
"
    )
}

/// `true` when `path` falls under the served mount. The boundary is a
/// path segment: `/my-appother` is outside a `/my-app` mount.
fn within_served_path(path: &str, served: &str) -> bool {
    if served.is_empty() {
        return true;
    }
    path == served
        || path
            .strip_prefix(served)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Reject path traversal and other suspicious relative paths.
fn sanitize_rel_path(rel: &str) -> Option<PathBuf> {
    if rel.contains('\\') {
        return None;
    }

    let mut out = PathBuf::new();
    for part in rel.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            part => out.push(part),
        }
    }
    Some(out)
}

fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "html" => "text/html",
        "js" | "mjs" => "application/javascript",
        "css" => "text/css",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

fn clear_console() {
    print!("\x1B[2J\x1B[3J\x1B[H");
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

/// Open a URL in the default browser.
fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_rel_path_accepts_nested_files() {
        assert_eq!(
            sanitize_rel_path("static/js/app.js"),
            Some(PathBuf::from("static/js/app.js"))
        );
        assert_eq!(
            sanitize_rel_path("a//b/./c.txt"),
            Some(PathBuf::from("a/b/c.txt"))
        );
    }

    #[test]
    fn test_sanitize_rel_path_rejects_traversal() {
        assert_eq!(sanitize_rel_path("../secret"), None);
        assert_eq!(sanitize_rel_path("a/../../b"), None);
        assert_eq!(sanitize_rel_path(r"a\b"), None);
    }

    #[test]
    fn test_interpolate_html_replaces_known_keys() {
        let mut values = BTreeMap::new();
        values.insert("PUBLIC_URL".to_string(), "/app".to_string());
        values.insert("REACT_APP_TITLE".to_string(), "Demo".to_string());

        let html = r#"<link href="%PUBLIC_URL%/favicon.ico"><title>%REACT_APP_TITLE%</title><p>%UNKNOWN%</p>"#;
        let out = interpolate_html(html, &values);
        assert!(out.contains(r#"href="/app/favicon.ico""#));
        assert!(out.contains("<title>Demo</title>"));
        assert!(out.contains("%UNKNOWN%"));
    }

    #[test]
    fn test_inject_reload_client_prefers_head() {
        let html = "<html><head><title>x</title></head><body></body></html>";
        let out = inject_reload_client(html, "/__reload-client.js");
        let script_pos = out.find("/__reload-client.js").unwrap();
        let head_close = out.find("</head>").unwrap();
        assert!(script_pos < head_close);
    }

    #[test]
    fn test_inject_reload_client_body_fallback_and_idempotence() {
        let html = "<html><body></body></html>";
        let out = inject_reload_client(html, "/__reload-client.js");
        assert!(out.contains(r#"<script src="/__reload-client.js"></script>"#));

        let again = inject_reload_client(&out, "/__reload-client.js");
        assert_eq!(out, again);
    }

    #[test]
    fn test_inject_reload_client_appends_without_markup() {
        let out = inject_reload_client("plain", "/__reload-client.js");
        assert!(out.ends_with(r#"<script src="/__reload-client.js"></script>"#));
    }

    #[test]
    fn test_reload_client_script_defaults_to_page_location() {
        let socket = SocketConfig {
            host: None,
            path: "/ws".to_string(),
            port: None,
        };
        let script = reload_client_script(&socket);
        assert!(script.contains("window.location.hostname"));
        assert!(script.contains("window.location.port"));
        assert!(script.contains(r#""/ws""#));
    }

    #[test]
    fn test_reload_client_script_honors_overrides() {
        let socket = SocketConfig {
            host: Some("reload.example.test".to_string()),
            path: "/custom".to_string(),
            port: Some("8081".to_string()),
        };
        let script = reload_client_script(&socket);
        assert!(script.contains(r#""reload.example.test""#));
        assert!(script.contains(r#""8081""#));
        assert!(script.contains(r#""/custom""#));
    }

    #[test]
    fn test_reload_message_json() {
        assert_eq!(ReloadMessage::Reload.to_json(), r#"{"type":"reload"}"#);
        assert_eq!(
            ReloadMessage::Connected.to_json(),
            r#"{"type":"connected"}"#
        );
    }

    #[test]
    fn test_content_type_for_common_extensions() {
        assert_eq!(content_type_for("html"), "text/html");
        assert_eq!(content_type_for("js"), "application/javascript");
        assert_eq!(content_type_for("svg"), "image/svg+xml");
        assert_eq!(content_type_for("weird"), "application/octet-stream");
    }

    #[test]
    fn test_parse_port_rejects_non_numeric_values() {
        assert_eq!(parse_port("3001").unwrap(), 3001);

        let err = parse_port("abc").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));
        assert!(err.to_string().contains("\"abc\""));

        assert!(parse_port("70000").is_err());
    }

    #[test]
    fn test_reload_routes_rooted_for_production_public_url() {
        let snapshot = EnvironmentSnapshot::from_vars([
            ("NODE_ENV".to_string(), "production".to_string()),
            (
                "PUBLIC_URL".to_string(),
                "https://cdn.example.com/assets".to_string(),
            ),
        ]);
        let paths = ProjectPaths::resolve(Path::new("/app"), &snapshot, None);

        let served = paths.served_path();
        let reload_route = format!("{served}__reload-client.js");
        let sw_route = format!("{served}service-worker.js");
        assert_eq!(reload_route, "/assets/__reload-client.js");
        assert_eq!(sw_route, "/assets/service-worker.js");

        // axum rejects route paths that do not start with `/`.
        let _router: Router<()> = Router::new()
            .route(&reload_route, get(|| async {}))
            .route(&sw_route, get(|| async {}));
    }

    #[test]
    fn test_within_served_path_respects_segment_boundary() {
        assert!(within_served_path("/anything", ""));
        assert!(within_served_path("/my-app", "/my-app"));
        assert!(within_served_path("/my-app/static/js/app.js", "/my-app"));
        assert!(!within_served_path("/my-appother", "/my-app"));
        assert!(!within_served_path("/other", "/my-app"));
    }

    #[test]
    fn test_watch_events_flush_after_quiet_window() {
        let (raw_tx, raw_rx) = std::sync::mpsc::channel();
        let (change_tx, mut change_rx) = mpsc::channel(16);

        let pump = std::thread::spawn(move || {
            pump_watch_events(&raw_rx, Path::new("/app/build"), &change_tx);
        });

        // A single save with no follow-up events must still reload.
        let event = notify::Event {
            kind: notify::EventKind::Modify(notify::event::ModifyKind::Any),
            paths: vec![PathBuf::from("/app/src/index.js")],
            attrs: notify::event::EventAttributes::default(),
        };
        raw_tx.send(Ok(event)).unwrap();

        let changed = change_rx.blocking_recv().unwrap();
        assert_eq!(changed, vec!["/app/src/index.js".to_string()]);

        drop(raw_tx);
        pump.join().unwrap();
    }

    #[test]
    fn test_watch_events_skip_build_output_and_irrelevant_files() {
        let (raw_tx, raw_rx) = std::sync::mpsc::channel();
        let (change_tx, mut change_rx) = mpsc::channel(16);

        let pump = std::thread::spawn(move || {
            pump_watch_events(&raw_rx, Path::new("/app/build"), &change_tx);
        });

        let event = notify::Event {
            kind: notify::EventKind::Modify(notify::event::ModifyKind::Any),
            paths: vec![
                PathBuf::from("/app/build/main.js"),
                PathBuf::from("/app/src/readme.md"),
            ],
            attrs: notify::event::EventAttributes::default(),
        };
        raw_tx.send(Ok(event)).unwrap();
        drop(raw_tx);
        pump.join().unwrap();

        assert!(change_rx.blocking_recv().is_none());
    }
}
