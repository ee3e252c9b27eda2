/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时评估的文件数量上限（0 表示不限制，全部并发）
    pub max_concurrent_evaluations: usize,
    /// 远程评估失败时是否返回模拟结果（显式开启）
    pub simulate_on_failure: bool,
    /// 基准文件大小上限（字节）
    pub max_base_file_bytes: u64,
    /// 数据目录（存放网关快照与本地缓存）
    pub data_dir: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 命令行运行参数 ---
    /// 科目定义文件（TOML）
    pub subject_file: String,
    /// 基准文件路径
    pub base_file: String,
    /// 待评估文件目录
    pub submissions_folder: String,
    /// 本地账号
    pub account_id: String,
    pub account_name: String,
    pub account_email: String,
    pub account_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_evaluations: 0,
            simulate_on_failure: false,
            max_base_file_bytes: 20 * 1024 * 1024,
            data_dir: "data".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-1.5-flash".to_string(),
            llm_temperature: 0.4,
            llm_max_tokens: 4096,
            subject_file: "subjects.toml".to_string(),
            base_file: "base.pdf".to_string(),
            submissions_folder: "submissions".to_string(),
            account_id: "local-teacher".to_string(),
            account_name: "Docente".to_string(),
            account_email: "docente@example.com".to_string(),
            account_password: "cambiar123".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_evaluations: std::env::var("MAX_CONCURRENT_EVALUATIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_evaluations),
            simulate_on_failure: std::env::var("SIMULATE_ON_FAILURE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.simulate_on_failure),
            max_base_file_bytes: std::env::var("MAX_BASE_FILE_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_base_file_bytes),
            data_dir: std::env::var("DATA_DIR").unwrap_or(default.data_dir),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: std::env::var("LLM_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_temperature),
            llm_max_tokens: std::env::var("LLM_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_max_tokens),
            subject_file: std::env::var("SUBJECT_FILE").unwrap_or(default.subject_file),
            base_file: std::env::var("BASE_FILE").unwrap_or(default.base_file),
            submissions_folder: std::env::var("SUBMISSIONS_FOLDER").unwrap_or(default.submissions_folder),
            account_id: std::env::var("ACCOUNT_ID").unwrap_or(default.account_id),
            account_name: std::env::var("ACCOUNT_NAME").unwrap_or(default.account_name),
            account_email: std::env::var("ACCOUNT_EMAIL").unwrap_or(default.account_email),
            account_password: std::env::var("ACCOUNT_PASSWORD").unwrap_or(default.account_password),
        }
    }

    /// 网关快照文件路径
    pub fn gateway_snapshot_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("gateway.json")
    }

    /// 本地缓存目录
    pub fn cache_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("cache")
    }
}
