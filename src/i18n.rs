// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库，消息文件见 locales/
// 支持中文（默认）和英文
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

pub const DEFAULT_LOCALE: &str = "zh-CN";
pub const SUPPORTED_LOCALES: [&str; 2] = ["zh-CN", "en"];

/// 按环境变量 STORAGE_ALLOCATION_LANG 设置语言
///
/// 未设置或不支持的语言回退到 zh-CN
pub fn init_from_env() {
    let requested = std::env::var("STORAGE_ALLOCATION_LANG").unwrap_or_default();
    let locale = resolve_locale(&requested);
    if !requested.trim().is_empty() && locale != requested.trim() {
        tracing::warn!(requested = %requested, fallback = locale, "不支持的语言，使用默认语言");
    }
    set_locale(locale);
}

/// "en-US" / "EN" → "en"；无法识别时返回默认语言
fn resolve_locale(requested: &str) -> &'static str {
    let requested = requested.trim();
    SUPPORTED_LOCALES
        .iter()
        .copied()
        .find(|l| l.eq_ignore_ascii_case(requested))
        .or_else(|| {
            let lang = requested.split(['-', '_']).next().unwrap_or_default();
            SUPPORTED_LOCALES
                .iter()
                .copied()
                .find(|l| l.split('-').next().is_some_and(|p| p.eq_ignore_ascii_case(lang)))
        })
        .unwrap_or(DEFAULT_LOCALE)
}

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"zh-CN" 或 "en"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use storage_allocation::i18n::t;
/// let msg = t("allocation.no_stock");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use storage_allocation::i18n::t_with_args;
/// let msg = t_with_args("allocation.service_failed", &[("error", "timeout")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = rust_i18n::t!(key).to_string();
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}
