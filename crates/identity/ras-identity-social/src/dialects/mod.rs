//! One [`Dialect`](crate::dialect::Dialect) implementation per provider.

mod alipay;
mod baidu;
mod bitbucket;
mod facebook;
mod github;
mod gitlab;
mod google;
mod linkedin;
mod passport;
mod qq;
mod wechat;
mod weibo;

pub use alipay::AlipayDialect;
pub use baidu::BaiduDialect;
pub use bitbucket::BitbucketDialect;
pub use facebook::{DEFAULT_GRAPH_VERSION, FacebookDialect};
pub use github::GithubDialect;
pub use gitlab::{DEFAULT_HOST as GITLAB_DEFAULT_HOST, GitlabDialect};
pub use google::GoogleDialect;
pub use linkedin::LinkedinDialect;
pub use passport::{LARVA_HOST, LIBRESPEED_HOST, PassportDialect};
pub use qq::QqDialect;
pub use wechat::{WechatWebDialect, map_wechat_profile};
pub use weibo::WeiboDialect;
