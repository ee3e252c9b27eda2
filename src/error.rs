use phf::phf_map;
use thiserror::Error;

/// 应用程序错误类型
///
/// `Display` 面向日志（中文），`user_message()` 面向最终用户（西班牙语界面文案）。
#[derive(Debug, Error)]
pub enum AppError {
    /// 前置校验错误（不会发起任何远程调用）
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 远程评估服务错误
    #[error("评估错误: {0}")]
    Evaluation(#[from] EvaluationError),
    /// 认证服务错误
    #[error("认证错误: {0}")]
    Auth(#[source] AuthError),
    /// 持久化网关错误
    #[error("存储错误: {0}")]
    Persistence(#[from] PersistenceError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 账号删除中途失败（已完成的步骤不会回滚）
    #[error("账号删除在「{step}」步骤失败: {source}")]
    AccountDeletion {
        step: DeletionStep,
        #[source]
        source: Box<AppError>,
    },
}

/// 账号删除的有序步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionStep {
    Reauthenticate,
    Tasks,
    Subjects,
    Profile,
    AuthAccount,
    LocalCache,
}

impl std::fmt::Display for DeletionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeletionStep::Reauthenticate => "重新认证",
            DeletionStep::Tasks => "删除评估记录",
            DeletionStep::Subjects => "删除科目",
            DeletionStep::Profile => "删除资料文档",
            DeletionStep::AuthAccount => "删除认证账号",
            DeletionStep::LocalCache => "清理本地缓存",
        };
        f.write_str(name)
    }
}

/// 校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("未选择科目")]
    NoSubjectSelected,
    #[error("待评估文件队列为空")]
    NoFilesQueued,
    #[error("科目不存在: {id}")]
    SubjectNotFound { id: String },
    #[error("评估记录不存在: {id}")]
    TaskNotFound { id: String },
    #[error("科目 {subject} 尚未上传基准文件")]
    MissingBaseFile { subject: String },
    #[error("科目 {subject} 的基准文件 {file_name} 不在内存中，需要重新加载")]
    BaseFileNotLoaded { subject: String, file_name: String },
    #[error("科目 {subject} 没有已登记的基准文件，无法重新加载")]
    NoBaseFileToReload { subject: String },
    #[error("科目名称不能为空")]
    EmptySubjectName,
    #[error("评分标准不能为空")]
    EmptyCriteria,
    #[error("文件 {file_name} 不是 PDF")]
    NotAPdf { file_name: String },
    #[error("文件 {file_name} 大小 {size} 超过上限 {limit}")]
    FileTooLarge {
        file_name: String,
        size: u64,
        limit: u64,
    },
    #[error("两次输入的密码不一致")]
    PasswordMismatch,
    #[error("密码长度不足 {min} 位")]
    WeakPassword { min: usize },
    #[error("未提供确认密码")]
    MissingPassword,
    #[error("当前没有已登录的用户")]
    NotAuthenticated,
}

impl ValidationError {
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::NoSubjectSelected => "Selecciona una asignatura".to_string(),
            ValidationError::NoFilesQueued => "Agrega archivos PDF para evaluar".to_string(),
            ValidationError::SubjectNotFound { .. } => {
                "La asignatura seleccionada no existe".to_string()
            }
            ValidationError::TaskNotFound { .. } => "La evaluación no existe".to_string(),
            ValidationError::MissingBaseFile { .. } => {
                "Esta asignatura necesita un archivo base antes de poder evaluar trabajos"
                    .to_string()
            }
            ValidationError::BaseFileNotLoaded { file_name, .. } => format!(
                "Necesitas volver a cargar el archivo base \"{}\" para esta asignatura.",
                file_name
            ),
            ValidationError::NoBaseFileToReload { .. } => {
                "Esta asignatura no tiene un archivo base registrado; súbelo primero".to_string()
            }
            ValidationError::EmptySubjectName => {
                "El nombre de la asignatura es obligatorio".to_string()
            }
            ValidationError::EmptyCriteria => {
                "Agrega al menos un criterio de evaluación".to_string()
            }
            ValidationError::NotAPdf { .. } => {
                "Solo se permiten archivos PDF para el archivo base".to_string()
            }
            ValidationError::FileTooLarge {
                file_name, limit, ..
            } => format!(
                "El archivo \"{}\" supera el tamaño máximo permitido ({} bytes)",
                file_name, limit
            ),
            ValidationError::PasswordMismatch => "Las contraseñas no coinciden".to_string(),
            ValidationError::WeakPassword { min } => {
                format!("La contraseña debe tener al menos {} caracteres", min)
            }
            ValidationError::MissingPassword => {
                "Ingresa tu contraseña para confirmar".to_string()
            }
            ValidationError::NotAuthenticated => "Debes iniciar sesión".to_string(),
        }
    }
}

/// 远程评估服务错误
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("未配置 LLM API Key")]
    MissingApiKey,
    #[error("LLM API 调用失败 (模型: {model}, 状态: {status:?}): {message}")]
    ApiCallFailed {
        model: String,
        status: Option<String>,
        message: String,
    },
    #[error("LLM 返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 认证服务错误
///
/// 由认证提供方的错误码（或包含错误码的消息）映射而来
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("密码错误")]
    WrongPassword,
    #[error("邮箱已被其他账号使用")]
    EmailInUse,
    #[error("密码强度不足")]
    WeakPassword,
    #[error("需要重新登录")]
    RequiresRecentLogin,
    #[error("用户不存在")]
    UserNotFound,
    #[error("邮箱格式无效")]
    InvalidEmail,
    #[error("当前没有登录的用户")]
    NotSignedIn,
    #[error("认证服务错误: {0}")]
    Provider(String),
}

/// 触发认证错误的用户操作，决定本地化文案
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    SignIn,
    UpdateProfile,
    DeleteAccount,
}

static PROVIDER_CODES: phf::Map<&'static str, AuthError> = phf_map! {
    "wrong-password" => AuthError::WrongPassword,
    "invalid-credential" => AuthError::WrongPassword,
    "email-already-in-use" => AuthError::EmailInUse,
    "weak-password" => AuthError::WeakPassword,
    "requires-recent-login" => AuthError::RequiresRecentLogin,
    "user-not-found" => AuthError::UserNotFound,
    "invalid-email" => AuthError::InvalidEmail,
};

impl AuthError {
    /// 根据提供方返回的消息（如 `auth/email-already-in-use`）识别错误类型
    pub fn from_provider_message(message: &str) -> Self {
        PROVIDER_CODES
            .entries()
            .find(|(code, _)| message.contains(*code))
            .map(|(_, err)| err.clone())
            .unwrap_or_else(|| {
                AuthError::Provider(message.replace("Firebase:", "").trim().to_string())
            })
    }

    pub fn user_message(&self, action: AuthAction) -> String {
        match (self, action) {
            (AuthError::RequiresRecentLogin, AuthAction::DeleteAccount) => {
                "Necesitas volver a iniciar sesión antes de eliminar tu cuenta".to_string()
            }
            (AuthError::RequiresRecentLogin, _) => {
                "Para cambiar el email o contraseña, necesitas volver a iniciar sesión".to_string()
            }
            (AuthError::WrongPassword, _) => "Contraseña incorrecta".to_string(),
            (AuthError::EmailInUse, _) => "Este correo ya está en uso por otra cuenta".to_string(),
            (AuthError::WeakPassword, _) => "La contraseña es demasiado débil".to_string(),
            (AuthError::UserNotFound, _) => "No existe una cuenta con este correo".to_string(),
            (AuthError::InvalidEmail, _) => "El correo electrónico no es válido".to_string(),
            (AuthError::NotSignedIn, _) => "No hay ninguna sesión iniciada".to_string(),
            (AuthError::Provider(message), _) => message.clone(),
        }
    }
}

/// 持久化网关错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("文档不存在 ({collection}/{id})")]
    DocumentNotFound { collection: String, id: String },
    #[error("存储操作 {operation} 失败: {message}")]
    Backend { operation: String, message: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("JSON解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::File(FileError::JsonParseFailed {
            path: String::new(),
            source: err,
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: err,
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: err,
        })
    }
}

impl From<AuthError> for AppError {
    /// 提供方原样返回的消息先按错误码归类
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Provider(message) => {
                AppError::Auth(AuthError::from_provider_message(&message))
            }
            other => AppError::Auth(other),
        }
    }
}

impl From<async_openai::error::OpenAIError> for AppError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        let status = match &err {
            async_openai::error::OpenAIError::ApiError(api) => api.code.clone(),
            _ => None,
        };
        AppError::Evaluation(EvaluationError::ApiCallFailed {
            model: String::new(),
            status,
            message: err.to_string(),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建存储后端错误
    pub fn persistence(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::Persistence(PersistenceError::Backend {
            operation: operation.into(),
            message: message.to_string(),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 把某个删除步骤的错误包装起来
    pub fn deletion(step: DeletionStep, source: impl Into<AppError>) -> Self {
        AppError::AccountDeletion {
            step,
            source: Box::new(source.into()),
        }
    }

    /// 是否为前置校验错误
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }

    /// 转换为面向用户的提示文案
    pub fn user_message(&self) -> String {
        self.user_message_for(AuthAction::SignIn)
    }

    /// 转换为面向用户的提示文案（认证错误按操作区分）
    pub fn user_message_for(&self, action: AuthAction) -> String {
        match self {
            AppError::Validation(e) => e.user_message(),
            AppError::Auth(e) => e.user_message(action),
            AppError::Evaluation(EvaluationError::MissingApiKey) => {
                "API Key de Gemini no configurada".to_string()
            }
            AppError::Evaluation(EvaluationError::ApiCallFailed {
                status, message, ..
            }) => match status {
                Some(status) => format!("Error de API: {} - {}", status, message),
                None => format!("Error de API: {}", message),
            },
            AppError::Evaluation(EvaluationError::EmptyContent { .. }) => {
                "Respuesta inválida de la API".to_string()
            }
            AppError::Persistence(_) => {
                "Ocurrió un error al acceder a la base de datos".to_string()
            }
            AppError::File(_) => "No se pudo leer o escribir el archivo".to_string(),
            AppError::AccountDeletion { source, .. } => {
                source.user_message_for(AuthAction::DeleteAccount)
            }
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
