//! `gate.Biz` service: placeholder business endpoints.
//!
//! The handlers carry no logic; every call is still admitted, broadcast and
//! counted by the pipeline before it lands here.

use proto_gen::gate::biz_server::Biz;
use proto_gen::gate::Nothing;
use tonic::{Request, Response, Status};

#[derive(Debug, Default, Clone, Copy)]
pub struct BizService;

#[tonic::async_trait]
impl Biz for BizService {
    async fn check(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(Response::new(request.into_inner()))
    }

    async fn add(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(Response::new(request.into_inner()))
    }

    async fn test(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(Response::new(request.into_inner()))
    }
}
