//! Backend that records nothing and completes everything immediately.

#[derive(Clone, Debug)]
pub struct Api;
#[derive(Debug)]
pub struct Context;
#[derive(Debug)]
pub struct Encoder;
#[derive(Debug)]
pub struct Resource;

type DeviceResult<T> = Result<T, crate::DeviceError>;

impl crate::Api for Api {
    type Device = Context;
    type Queue = Context;
    type CommandBuffer = Encoder;
    type Fence = Resource;
}

impl crate::Device<Api> for Context {
    fn create_command_buffer(&self) -> DeviceResult<Encoder> {
        Ok(Encoder)
    }
    fn destroy_command_buffer(&self, _cmd_buf: Encoder) {}

    fn create_fence(&self) -> DeviceResult<Resource> {
        Ok(Resource)
    }
    fn destroy_fence(&self, _fence: Resource) {}
    fn reset_fence(&self, _fence: &mut Resource) -> DeviceResult<()> {
        Ok(())
    }
    fn get_fence_status(&self, _fence: &Resource) -> DeviceResult<bool> {
        Ok(true)
    }
    fn wait_for_fences(
        &self,
        _fences: &[&Resource],
        _wait_for: crate::WaitFor,
        _timeout_ns: u64,
    ) -> DeviceResult<bool> {
        Ok(true)
    }
}

impl crate::Queue<Api> for Context {
    fn submit(&mut self, _command_buffer: &Encoder, _signal_fence: &Resource) -> DeviceResult<()> {
        Ok(())
    }
}

impl crate::CommandBuffer<Api> for Encoder {
    fn begin(&mut self) -> DeviceResult<()> {
        Ok(())
    }
    fn end(&mut self) -> DeviceResult<()> {
        Ok(())
    }
}
