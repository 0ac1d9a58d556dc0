use std::collections::HashMap;

const EN: &[(&str, &str)] = &[
    // Interactive mode
    ("welcome", "nlsh: describe what you want to do, in plain language"),
    ("interactive_hint", "Built-ins: exit, quit, history, stats, clear. Ctrl-C ends the session."),
    ("prompt", "nlsh> "),
    ("goodbye", "Bye!"),
    ("interrupted", "Interrupted, finishing the current turn"),
    // Turn progress
    ("translating", "Translating..."),
    ("executing", "Executing..."),
    ("generated_command", "Command:"),
    ("explanation", "Explanation:"),
    ("warnings", "Warnings:"),
    ("risk", "Risk:"),
    ("risk_low", "low"),
    ("risk_medium", "medium"),
    ("risk_high", "high"),
    ("confirm_prompt", "Execute this command? [y/N] "),
    ("confirm_high_prompt", "This command is dangerous. Type 'yes' to execute: "),
    ("cancelled", "Execution cancelled"),
    ("translation_failed", "Could not translate the request: {0}"),
    // Results
    ("success", "Command succeeded"),
    ("failure", "Command failed, exit code: {0}"),
    ("timed_out", "Command timed out"),
    ("stdout", "Output:"),
    ("stderr", "Error output:"),
    ("error", "Error:"),
    // History
    ("history_records", "History records:"),
    ("no_records", "No history records"),
    ("search_results", "Matches for \"{0}\":"),
    ("no_matches", "No matches found"),
    ("history_cleared", "History cleared"),
    ("exported", "Exported {0} records to {1}"),
    ("stats_title", "Statistics:"),
    ("stats_total", "Total commands: {0}"),
    ("stats_success", "Succeeded: {0}"),
    ("stats_error", "Failed: {0}"),
    ("stats_rate", "Success rate: {0}%"),
    ("stats_top", "Most used commands:"),
    ("config_path", "Config file: {0}"),
    ("api_key_missing", "OPENAI_API_KEY is not set; translation will fail until it is"),
];

const ZH: &[(&str, &str)] = &[
    ("welcome", "nlsh: 用自然语言描述你想做的事"),
    ("interactive_hint", "内置命令: exit, quit, history, stats, clear。按 Ctrl-C 结束会话。"),
    ("prompt", "nlsh> "),
    ("goodbye", "再见!"),
    ("interrupted", "已中断，当前操作完成后退出"),
    ("translating", "正在翻译..."),
    ("executing", "正在执行..."),
    ("generated_command", "命令:"),
    ("explanation", "说明:"),
    ("warnings", "警告:"),
    ("risk", "风险:"),
    ("risk_low", "低"),
    ("risk_medium", "中"),
    ("risk_high", "高"),
    ("confirm_prompt", "执行此命令? [y/N] "),
    ("confirm_high_prompt", "此命令很危险。输入 'yes' 执行: "),
    ("cancelled", "已取消执行"),
    ("translation_failed", "无法翻译请求: {0}"),
    ("success", "命令执行成功"),
    ("failure", "命令执行失败，退出码: {0}"),
    ("timed_out", "命令执行超时"),
    ("stdout", "输出:"),
    ("stderr", "错误输出:"),
    ("error", "错误:"),
    ("history_records", "历史记录:"),
    ("no_records", "没有历史记录"),
    ("search_results", "\"{0}\" 的匹配结果:"),
    ("no_matches", "未找到匹配项"),
    ("history_cleared", "历史记录已清空"),
    ("exported", "已导出 {0} 条记录到 {1}"),
    ("stats_title", "统计信息:"),
    ("stats_total", "总命令数: {0}"),
    ("stats_success", "成功: {0}"),
    ("stats_error", "失败: {0}"),
    ("stats_rate", "成功率: {0}%"),
    ("stats_top", "最常用的命令:"),
    ("config_path", "配置文件: {0}"),
    ("api_key_missing", "未设置 OPENAI_API_KEY，翻译将会失败"),
];

pub struct I18n {
    translations: HashMap<String, HashMap<String, String>>,
    current_lang: String,
}

impl I18n {
    pub fn new(lang: &str) -> Self {
        let table = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        let mut translations = HashMap::new();
        translations.insert("en".to_string(), table(EN));
        translations.insert("zh".to_string(), table(ZH));

        let lang = lang.to_lowercase();
        let effective_lang = if lang.starts_with("zh") || lang == "cn" || lang == "chinese" {
            "zh"
        } else {
            "en"
        };

        Self {
            translations,
            current_lang: effective_lang.to_string(),
        }
    }

    pub fn lang(&self) -> &str {
        &self.current_lang
    }

    pub fn t(&self, key: &str) -> String {
        if let Some(lang_map) = self.translations.get(&self.current_lang) {
            if let Some(value) = lang_map.get(key) {
                return value.clone();
            }
        }
        key.to_string()
    }

    pub fn t_format(&self, key: &str, args: &[&str]) -> String {
        let mut result = self.t(key);
        for (i, arg) in args.iter().enumerate() {
            result = result.replace(&format!("{{{}}}", i), arg);
        }
        result
    }
}
