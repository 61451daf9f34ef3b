pub mod chain;
pub mod error;
pub mod lightning;
pub mod logging;
pub mod swap;

pub mod proto {
    pub mod subswap {
        pub mod v1 {
            tonic::include_proto!("subswap.v1");
        }
    }

    pub mod lnnode {
        pub mod v1 {
            tonic::include_proto!("lnnode.v1");
        }
    }
}
