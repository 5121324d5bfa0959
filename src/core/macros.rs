//! 核心宏定义
//!
//! 提供统一的宏来减少配置结构体的样板代码

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use feedback_particles::impl_default;
///
/// struct Viewport {
///     width: u32,
///     height: u32,
/// }
///
/// impl_default!(Viewport {
///     width: 800,
///     height: 600,
/// });
///
/// assert_eq!(Viewport::default().width, 800);
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #[derive(Debug, PartialEq)]
    struct PointStyle {
        size: f32,
        color: [f32; 4],
    }

    impl_default!(PointStyle {
        size: 0.1,
        color: [0.0, 0.0, 0.0, 1.0],
    });

    #[test]
    fn test_impl_default() {
        let style = PointStyle::default();
        assert_eq!(style.size, 0.1);
        assert_eq!(style.color[3], 1.0);
    }
}
