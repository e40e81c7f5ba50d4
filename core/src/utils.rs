//! 工具函数模块

/// 验证表名是否安全（允许 `schema.table` 形式）
pub fn is_safe_table_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_safe_segment)
}

/// 验证字段名是否安全（允许 `table.column` 形式）
pub fn is_safe_field_name(name: &str) -> bool {
    is_safe_table_name(name)
}

fn is_safe_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_names() {
        assert!(is_safe_table_name("users"));
        assert!(is_safe_table_name("public.users"));
        assert!(is_safe_field_name("created_at"));
        assert!(is_safe_field_name("u.id"));
        assert!(is_safe_field_name("_private1"));
    }

    #[test]
    fn test_unsafe_names() {
        assert!(!is_safe_table_name(""));
        assert!(!is_safe_field_name("1abc"));
        assert!(!is_safe_field_name("id; DROP TABLE users"));
        assert!(!is_safe_field_name("a..b"));
        assert!(!is_safe_field_name("name\""));
        assert!(!is_safe_field_name("users."));
    }
}
