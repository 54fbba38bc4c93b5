/// 限流计数键前缀
const RATE_LIMIT_PREFIX: &str = "ratelimit:";

/// 单个商品缓存键前缀
const ENTITY_PREFIX: &str = "cache:entity:";

/// 商品列表缓存键前缀
const LIST_PREFIX: &str = "cache:list:";

/// 匹配所有列表缓存键
pub const LIST_PATTERN: &str = "cache:list:*";

pub fn rate_limit_key(identity: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, identity)
}

pub fn entity_key(id: &str) -> String {
    format!("{}{}", ENTITY_PREFIX, id)
}

pub fn list_key(page: u32, limit: u32) -> String {
    format!("{}{}:{}", LIST_PREFIX, page, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_do_not_overlap() {
        assert_eq!(rate_limit_key("1.2.3.4"), "ratelimit:1.2.3.4");
        assert_eq!(entity_key("42"), "cache:entity:42");
        assert_eq!(list_key(2, 10), "cache:list:2:10");

        assert!(list_key(1, 10).starts_with(LIST_PATTERN.trim_end_matches('*')));
        assert!(!entity_key("7").starts_with(LIST_PATTERN.trim_end_matches('*')));
    }
}
