/// Hands an ended command buffer of a dispatch to a queue.
///
/// The scheduler picks the queue. Overriding the submitter lets a dispatch
/// bundle extra synchronization with its submission, such as swapchain
/// semaphores or layout transitions needed for presentation.
pub trait Submitter<A: hal::Api>: Send {
    fn submit(
        &mut self,
        queue: &mut A::Queue,
        cmd_buf: &A::CommandBuffer,
        fence: &A::Fence,
    ) -> Result<(), hal::DeviceError>;
}

impl<A, F> Submitter<A> for F
where
    A: hal::Api,
    F: FnMut(&mut A::Queue, &A::CommandBuffer, &A::Fence) -> Result<(), hal::DeviceError> + Send,
{
    fn submit(
        &mut self,
        queue: &mut A::Queue,
        cmd_buf: &A::CommandBuffer,
        fence: &A::Fence,
    ) -> Result<(), hal::DeviceError> {
        self(queue, cmd_buf, fence)
    }
}

/// Submits the command buffer as is, signaling the dispatch fence.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSubmitter;

impl<A: hal::Api> Submitter<A> for DefaultSubmitter {
    fn submit(
        &mut self,
        queue: &mut A::Queue,
        cmd_buf: &A::CommandBuffer,
        fence: &A::Fence,
    ) -> Result<(), hal::DeviceError> {
        use hal::Queue as _;

        queue.submit(cmd_buf, fence)
    }
}
