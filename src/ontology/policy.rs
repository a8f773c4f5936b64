//! 动作策略校验
//!
//! validate_action 是 Identity 与待执行动作的纯函数：返回 bool，永不抛错，
//! 调用方必须检查返回值。策略来源于配置（[policy] 段），不存在全局可变状态。

use std::path::{Component, Path, PathBuf};

use crate::config::PolicySection;
use crate::ontology::Identity;

/// 动作策略：白名单、禁用类别、文件系统根
#[derive(Debug, Clone, Default)]
pub struct ActionPolicy {
    /// 允许的动作名或前缀（空 = 全部允许，再经 denied 过滤）
    allowed_actions: Vec<String>,
    /// 禁用的动作类别（按前缀匹配）
    denied_categories: Vec<String>,
    /// 参数中的路径必须落在这些根目录之下；空 = 不限制
    allowed_roots: Vec<PathBuf>,
}

impl ActionPolicy {
    pub fn from_config(cfg: &PolicySection) -> Self {
        Self {
            allowed_actions: cfg.allowed_actions.clone(),
            denied_categories: cfg.denied_categories.clone(),
            allowed_roots: cfg.allowed_roots.clone(),
        }
    }

    pub fn with_allowed_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.allowed_roots = roots;
        self
    }

    /// 校验动作是否允许执行（Identity 权限集 + 策略 deny 列表 + 路径约束）
    ///
    /// 纯函数：任何异常情况（参数不是对象、路径不可解析等）一律返回 false。
    pub fn validate_action(
        &self,
        identity: &Identity,
        action: &str,
        parameters: &serde_json::Value,
    ) -> bool {
        if action.is_empty() {
            return false;
        }

        // 禁用类别优先于一切白名单
        if self
            .denied_categories
            .iter()
            .any(|cat| action.starts_with(cat.as_str()))
        {
            return false;
        }

        // Identity 权限集（空 = 不限制）
        if !identity.permitted_actions.is_empty()
            && !identity
                .permitted_actions
                .iter()
                .any(|p| action == p || action.starts_with(p.as_str()))
        {
            return false;
        }

        // 策略级白名单（空 = 不限制）
        if !self.allowed_actions.is_empty()
            && !self
                .allowed_actions
                .iter()
                .any(|p| action == p || action.starts_with(p.as_str()))
        {
            return false;
        }

        // 参数中出现的路径必须落在允许的根目录内
        if !self.allowed_roots.is_empty() && !self.paths_within_roots(parameters) {
            return false;
        }

        true
    }

    fn paths_within_roots(&self, parameters: &serde_json::Value) -> bool {
        let Some(obj) = parameters.as_object() else {
            // 非对象参数没有路径字段，放行
            return true;
        };
        for (key, value) in obj {
            let looks_like_path = key == "path"
                || key == "file"
                || key == "dir"
                || key.ends_with("_path")
                || key.ends_with("_dir")
                || key.ends_with("_file");
            if !looks_like_path {
                continue;
            }
            let Some(s) = value.as_str() else {
                return false;
            };
            if !self.path_allowed(Path::new(s)) {
                return false;
            }
        }
        true
    }

    /// 不触碰文件系统的词法判定：拒绝 `..`，相对路径以第一个根解析
    fn path_allowed(&self, path: &Path) -> bool {
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return false;
        }
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            match self.allowed_roots.first() {
                Some(root) => root.join(path),
                None => return true,
            }
        };
        self.allowed_roots.iter().any(|root| resolved.starts_with(root))
    }
}
