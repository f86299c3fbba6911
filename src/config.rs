#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "3000")]
    pub port: u16,

    // this should be * for the player page to work from anywhere, it's written as is into
    // Access-Control-Allow-Origin on every response
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // metadata api root, /servers and /watch are appended to it
    #[clap(
        long,
        env,
        default_value = "https://consumet-eta-five.vercel.app/movies/flixhq"
    )]
    pub resolver_base_url: String,

    // server picked out of the /servers list
    #[clap(long, env, default_value = "upcloud")]
    pub preferred_server: String,

    // used when /m3u8 or /fetch-stream are hit without ids
    #[clap(long, env, default_value = "10766")]
    pub default_episode_id: String,

    #[clap(long, env, default_value = "tv/watch-rick-and-morty-39480")]
    pub default_media_id: String,

    // the cdn rejects anything that doesn't look like it came from the embed page
    #[clap(long, env, default_value = "https://streameeeeee.site/")]
    pub upstream_referer: String,

    #[clap(long, env, default_value = "https://streameeeeee.site")]
    pub upstream_origin: String,

    #[clap(
        long,
        env,
        default_value = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
    )]
    pub upstream_user_agent: String,

    // how long to wait for upstream headers (and full manifest bodies)
    #[clap(long, env, default_value = "30")]
    pub upstream_timeout_secs: u64,

    // resolved source urls are kept this long
    #[clap(long, env, default_value = "300")]
    pub resolution_ttl_secs: u64,

    #[clap(long, env, default_value = "1024")]
    pub resolution_cache_capacity: usize,

    // html player served at /
    #[clap(long, env, default_value = "player.html")]
    pub player_path: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl Default for AppConfig {
    // mirrors the clap defaults, mostly so tests can build services without a cli
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 3000,
            cors_origin: "*".to_string(),
            resolver_base_url: "https://consumet-eta-five.vercel.app/movies/flixhq".to_string(),
            preferred_server: "upcloud".to_string(),
            default_episode_id: "10766".to_string(),
            default_media_id: "tv/watch-rick-and-morty-39480".to_string(),
            upstream_referer: "https://streameeeeee.site/".to_string(),
            upstream_origin: "https://streameeeeee.site".to_string(),
            upstream_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            upstream_timeout_secs: 30,
            resolution_ttl_secs: 300,
            resolution_cache_capacity: 1024,
            player_path: "player.html".to_string(),
            sentry_dsn: None,
        }
    }
}
